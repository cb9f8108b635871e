use std::time::SystemTime;

use ferrotp::secret::Secret;
use ferrotp::totp::Totp;

pub fn main() -> anyhow::Result<()> {
    // Draw a fresh 160-bit secret from the OS and show its base32 form
    let secret = Secret::generate()?;
    println!("Secret: {secret}");

    // Initialize the TOTP with the defaults (SHA1 hash, 6-digits and 30 seconds period)
    let totp = Totp::new(secret.encoded());

    // The URI is what an authenticator app enrolls from, usually via a QR code
    let uri = totp.provisioning_uri("WaltorApp", "user@example.com")?;
    println!("Provisioning URI: {uri}");

    // Calculate time since Unix Epoch
    let now = SystemTime::now();
    let time_since_epoch = now.duration_since(SystemTime::UNIX_EPOCH)?;

    // Generate the code with the seconds
    let code = totp.generate(time_since_epoch.as_secs())?;
    println!(
        "Code: {}, Remaining time: {}",
        code,
        totp.remaining_seconds(time_since_epoch.as_secs())
    );

    // A code checks out against the window it was generated in
    let accepted = totp.verify(&code.to_string(), time_since_epoch.as_secs())?;
    println!("Verified: {accepted}");

    Ok(())
}
