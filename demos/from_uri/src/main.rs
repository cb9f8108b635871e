use std::time::SystemTime;

use ferrotp::totp::Totp;

pub fn main() -> anyhow::Result<()> {
    // The string an authenticator app would get from scanning an enrollment QR
    let uri = "otpauth://totp/WaltorApp:user%40example.com\
               ?secret=JBSWY3DPEHPK3PXP&issuer=WaltorApp\
               &algorithm=SHA1&digits=6&period=30";

    // Read secret and parameters back out of the URI
    let totp = Totp::from_uri(uri)?;

    // Get seconds since Unix Epoch
    let now = SystemTime::now();
    let time_since_epoch = now.duration_since(SystemTime::UNIX_EPOCH)?;

    // Generate the code with the seconds
    let code = totp.generate(time_since_epoch.as_secs())?;
    println!(
        "Code: {}, Remaining time: {}",
        code,
        totp.remaining_seconds(time_since_epoch.as_secs())
    );

    Ok(())
}
