use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::secret::decode_secret;
use crate::uri_helper;
use crate::{OtpCode, OtpError, OtpHashAlgorithm};

/// Time steps checked on either side of the current one when verifying
/// with [`Totp::verify`], per the RFC 6238 resynchronization guidance.
pub const DEFAULT_WINDOW_STEPS: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Totp {
    pub(crate) secret: String,
    pub(crate) algorithm: OtpHashAlgorithm,
    pub(crate) period: u64,
    pub(crate) digits: u32,
}

impl Totp {
    /// Creates the config for the [Time-based One-time Password Algorithm](http://en.wikipedia.org/wiki/Time-based_One-time_Password_Algorithm)
    /// (TOTP) given an RFC4648 base32 encoded secret.
    ///
    /// Obs.: This method defaults to the SHA1 hash, a 6-digit code and a
    /// period of 30 seconds, the parameters the installed base of
    /// authenticator apps assumes.
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            algorithm: OtpHashAlgorithm::SHA1,
            period: 30,
            digits: 6,
        }
    }

    /// Sets the hashing algorithm
    pub fn with_algorithm(&mut self, algorithm: OtpHashAlgorithm) -> &mut Self {
        self.algorithm = algorithm;

        self
    }

    /// Sets the number of digits to generate
    ///
    /// Counts outside the 6 to 8 range RFC4226 supports are rejected
    /// here, at configuration time, instead of surfacing mid-verification.
    pub fn with_digits(&mut self, digits: u32) -> Result<&mut Self, OtpError> {
        if !(6..=8).contains(&digits) {
            return Err(OtpError::InvalidDigitCount(digits));
        }
        self.digits = digits;

        Ok(self)
    }

    /// Sets the period in seconds
    pub fn with_period(&mut self, period: u64) -> Result<&mut Self, OtpError> {
        if period == 0 {
            return Err(OtpError::ZeroPeriod);
        }
        self.period = period;

        Ok(self)
    }

    /// Generates the code for one time step, the counter obtained by
    /// dividing seconds since the Unix epoch by the period.
    ///
    /// The step is serialized big-endian into 8 bytes, run through HMAC
    /// with the decoded secret as key, and dynamically truncated to the
    /// configured number of digits.
    pub fn generate_at_step(&self, step: u64) -> Result<OtpCode, OtpError> {
        let decoded = decode_secret(self.secret.as_str())?;
        let digest = calc_digest(decoded.as_slice(), self.algorithm, step);

        let code = encode_digest_truncated(digest.as_ref(), self.digits)?;

        Ok(OtpCode {
            code,
            digits: self.digits,
        })
    }

    /// Generates a Totp from the provided seconds since the UNIX epoch
    /// truncated to the specified number of digits
    pub fn generate(&self, seconds_since_epoch: u64) -> Result<OtpCode, OtpError> {
        self.generate_at_step(seconds_since_epoch / self.period)
    }

    /// Checks a user-supplied code against the current time step and
    /// [`DEFAULT_WINDOW_STEPS`] steps on either side.
    ///
    /// A wrong guess is an ordinary outcome, not an error: only a
    /// malformed secret makes this return `Err`.
    pub fn verify(&self, candidate: &str, seconds_since_epoch: u64) -> Result<bool, OtpError> {
        Ok(self
            .validate_window(candidate, seconds_since_epoch, DEFAULT_WINDOW_STEPS)?
            .is_some())
    }

    /// Validates a code against every step within `window_steps` whole
    /// steps of the current one, returning the step that matched or None
    /// if no step in the window does.
    ///
    /// Candidates of the wrong width or containing non-digit characters
    /// never match and never error, so a bad guess is indistinguishable
    /// from an expired one. Widening the window tolerates more client
    /// clock drift at the price of longer-lived codes.
    ///
    /// Obs.: the RFC recommends a window of 1 step in the past and 1 in
    /// the future, which is what [`Totp::verify`] uses.
    pub fn validate_window(
        &self,
        candidate: &str,
        seconds_since_epoch: u64,
        window_steps: u32,
    ) -> Result<Option<u64>, OtpError> {
        let decoded = decode_secret(self.secret.as_str())?;

        if candidate.len() != self.digits as usize
            || !candidate.bytes().all(|b| b.is_ascii_digit())
        {
            return Ok(None);
        }

        let current = seconds_since_epoch / self.period;

        for offset in -i64::from(window_steps)..=i64::from(window_steps) {
            let Some(step) = current.checked_add_signed(offset) else {
                continue;
            };

            let code = encode_digest_truncated(
                calc_digest(decoded.as_slice(), self.algorithm, step).as_ref(),
                self.digits,
            )?;
            let generated = OtpCode {
                code,
                digits: self.digits,
            };

            if generated.to_string() == candidate {
                return Ok(Some(step));
            }
        }

        Ok(None)
    }

    /// Seconds left before the current code rotates.
    pub fn remaining_seconds(&self, seconds_since_epoch: u64) -> u64 {
        self.period - seconds_since_epoch % self.period
    }

    /// Builds the `otpauth://totp/...` provisioning URI enrolling this
    /// secret and configuration under the given issuer and account label.
    ///
    /// The URI is what gets handed to a QR encoder for scanning; 320px or
    /// larger with a 1-module margin and medium error correction scans
    /// reliably on common devices.
    pub fn provisioning_uri(&self, issuer: &str, account: &str) -> Result<String, OtpError> {
        uri_helper::build_totp_uri(self, issuer, account)
    }

    /// Reads the secret and configuration back out of an
    /// `otpauth://totp/...` provisioning URI.
    pub fn from_uri(uri: &str) -> Result<Self, OtpError> {
        uri_helper::totp_from_uri(uri)
    }
}

/// Calculates the HMAC digest over the big-endian serialized step.
fn calc_digest(decoded_secret: &[u8], algorithm: OtpHashAlgorithm, step: u64) -> Vec<u8> {
    let message = step.to_be_bytes();

    match algorithm {
        OtpHashAlgorithm::SHA1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(decoded_secret)
                .expect("HMAC can take key of any size");
            mac.update(&message);
            mac.finalize().into_bytes().to_vec()
        }
        OtpHashAlgorithm::SHA256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(decoded_secret)
                .expect("HMAC can take key of any size");
            mac.update(&message);
            mac.finalize().into_bytes().to_vec()
        }
        OtpHashAlgorithm::SHA512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(decoded_secret)
                .expect("HMAC can take key of any size");
            mac.update(&message);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Encodes the HMAC digest into a truncated integer.
fn encode_digest_truncated(digest: &[u8], target_digits_count: u32) -> Result<u32, OtpError> {
    // The low nibble of the final byte selects the 4-byte window, for any
    // digest length.
    let offset = match digest.last() {
        Some(x) => *x & 0xf,
        None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    } as usize;

    // Gets the 4 bytes that will compose the code
    let code_bytes: [u8; 4] = match digest
        .get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
    {
        Some(x) => x,
        None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
    };

    // Top bit cleared so the value reads the same under any signedness.
    let code = u32::from_be_bytes(code_bytes);
    let truncation_factor = u32::pow(10, target_digits_count);

    Ok((code & 0x7fffffff) % truncation_factor)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use crate::totp::{encode_digest_truncated, Totp, DEFAULT_WINDOW_STEPS};
    use crate::{OtpError, OtpHashAlgorithm};

    #[fixture]
    #[once]
    pub fn sha1_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string()
    }

    #[fixture]
    #[once]
    pub fn sha256_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA".to_string()
    }

    #[fixture]
    #[once]
    pub fn sha512_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNA".to_string()
    }

    #[rstest]
    #[case(sha1_secret(), "sha1", 59, "94287082")]
    #[case(sha256_secret(), "sha256", 59, "46119246")]
    #[case(sha512_secret(), "sha512", 59, "90693936")]
    #[case(sha1_secret(), "sha1", 1111111109, "07081804")]
    #[case(sha256_secret(), "sha256", 1111111109, "68084774")]
    #[case(sha512_secret(), "sha512", 1111111109, "25091201")]
    #[case(sha1_secret(), "sha1", 1111111111, "14050471")]
    #[case(sha256_secret(), "sha256", 1111111111, "67062674")]
    #[case(sha512_secret(), "sha512", 1111111111, "99943326")]
    #[case(sha1_secret(), "sha1", 1234567890, "89005924")]
    #[case(sha256_secret(), "sha256", 1234567890, "91819424")]
    #[case(sha512_secret(), "sha512", 1234567890, "93441116")]
    #[case(sha1_secret(), "sha1", 2000000000, "69279037")]
    #[case(sha256_secret(), "sha256", 2000000000, "90698825")]
    #[case(sha512_secret(), "sha512", 2000000000, "38618901")]
    #[case(sha1_secret(), "sha1", 20000000000, "65353130")]
    #[case(sha256_secret(), "sha256", 20000000000, "77737706")]
    #[case(sha512_secret(), "sha512", 20000000000, "47863826")]
    #[case(sha1_secret(), "sha1", 20000000000, "353130")]
    #[case(sha256_secret(), "sha256", 20000000000, "737706")]
    #[case(sha512_secret(), "sha512", 20000000000, "863826")]
    #[case(sha1_secret(), "sha1", 1111111109, "081804")]
    fn reference_vectors(
        #[case] secret: String,
        #[case] hash: OtpHashAlgorithm,
        #[case] timestamp: u64,
        #[case] expected: &str,
    ) {
        let mut totp_base = Totp::new(secret);
        totp_base
            .with_algorithm(hash)
            .with_digits(expected.len() as u32)
            .unwrap();

        let generated_otp = totp_base.generate(timestamp).unwrap();
        assert_eq!(expected, generated_otp.to_string());
    }

    #[test]
    fn published_counter_vector() {
        let totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());

        assert_eq!(
            "927328",
            totp.generate_at_step(53273637).unwrap().to_string()
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());

        let first = totp.generate_at_step(53273637).unwrap();
        let second = totp.generate_at_step(53273637).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[rstest]
    #[case(6)]
    #[case(7)]
    #[case(8)]
    fn codes_are_zero_padded_to_width(#[case] digits: u32) {
        let mut totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());
        totp.with_digits(digits).unwrap();

        for step in [0, 1, 53273637, u64::MAX / 30] {
            let code = totp.generate_at_step(step).unwrap().to_string();

            assert_eq!(digits as usize, code.len());
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    // The RFC4226 appendix codes for counters 0..=9 under this secret:
    // steps 3..=7 come out as 969429, 338314, 254676, 287922, 162583.
    // Anchoring "now" inside step 5 makes every window assertion below a
    // published value instead of a self-computed one.
    #[fixture]
    fn window_totp() -> Totp {
        Totp::new("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string())
    }

    #[rstest]
    fn verify_accepts_current_step(window_totp: Totp) {
        assert!(window_totp.verify("254676", 155).unwrap());
    }

    #[rstest]
    #[case("338314", 4)]
    #[case("254676", 5)]
    #[case("287922", 6)]
    fn window_covers_adjacent_steps(
        window_totp: Totp,
        #[case] code: &str,
        #[case] matched_step: u64,
    ) {
        assert_eq!(
            Some(matched_step),
            window_totp
                .validate_window(code, 155, DEFAULT_WINDOW_STEPS)
                .unwrap()
        );
    }

    #[rstest]
    #[case("969429")]
    #[case("162583")]
    fn window_rejects_steps_two_away(window_totp: Totp, #[case] code: &str) {
        assert_eq!(
            None,
            window_totp
                .validate_window(code, 155, DEFAULT_WINDOW_STEPS)
                .unwrap()
        );
        assert!(!window_totp.verify(code, 155).unwrap());
    }

    #[rstest]
    #[case("969429", 3)]
    #[case("162583", 7)]
    fn widened_window_reaches_further_steps(
        window_totp: Totp,
        #[case] code: &str,
        #[case] matched_step: u64,
    ) {
        assert_eq!(
            Some(matched_step),
            window_totp.validate_window(code, 155, 2).unwrap()
        );
    }

    #[rstest]
    #[case("")]
    #[case("25467")]
    #[case("2546761")]
    #[case("25467a")]
    #[case(" 254676")]
    #[case("254 676")]
    fn verify_treats_malformed_codes_as_mismatch(window_totp: Totp, #[case] candidate: &str) {
        assert!(!window_totp.verify(candidate, 155).unwrap());
    }

    #[rstest]
    fn verify_rejects_wrong_code(window_totp: Totp) {
        assert!(!window_totp.verify("000000", 155).unwrap());
    }

    #[test]
    fn verify_propagates_malformed_secret() {
        let totp = Totp::new("not base32!".to_string());

        assert!(matches!(
            totp.verify("254676", 155),
            Err(OtpError::InvalidSecretFormat(_))
        ));
    }

    #[test]
    fn window_near_epoch_skips_underflowing_steps() {
        let totp = Totp::new("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string());

        // Step 0 is the earliest candidate; offsets below it are skipped.
        assert_eq!(
            Some(0),
            totp.validate_window("755224", 10, DEFAULT_WINDOW_STEPS)
                .unwrap()
        );
        assert_eq!(
            Some(1),
            totp.validate_window("287082", 10, DEFAULT_WINDOW_STEPS)
                .unwrap()
        );
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    #[case(9)]
    #[case(10)]
    fn digit_counts_outside_rfc_range_fail_configuration(#[case] digits: u32) {
        let mut totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());

        assert!(matches!(
            totp.with_digits(digits),
            Err(OtpError::InvalidDigitCount(_))
        ));
    }

    #[test]
    fn zero_period_fails_configuration() {
        let mut totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());

        assert!(matches!(totp.with_period(0), Err(OtpError::ZeroPeriod)));
    }

    // Dynamic truncation reads 4 bytes at an offset of up to 15, so a
    // digest under 19 bytes cannot be truncated safely. No current variant
    // is that short; this pins the bound for any future addition.
    #[rstest]
    #[case(OtpHashAlgorithm::SHA1)]
    #[case(OtpHashAlgorithm::SHA256)]
    #[case(OtpHashAlgorithm::SHA512)]
    fn digest_length_covers_truncation_window(#[case] algorithm: OtpHashAlgorithm) {
        assert!(algorithm.digest_len() >= 19);
    }

    #[test]
    fn truncation_rejects_short_digest() {
        // A digest whose final nibble points past its own end.
        let short = [0u8, 0, 0, 0xff];

        assert!(matches!(
            encode_digest_truncated(&short, 6),
            Err(OtpError::InvalidDigest(_))
        ));
        assert!(matches!(
            encode_digest_truncated(&[], 6),
            Err(OtpError::InvalidDigest(_))
        ));
    }

    #[test]
    fn remaining_seconds_counts_down_to_rotation() {
        let totp = Totp::new("JBSWY3DPEHPK3PXP".to_string());

        assert_eq!(30, totp.remaining_seconds(0));
        assert_eq!(1, totp.remaining_seconds(29));
        assert_eq!(30, totp.remaining_seconds(30));
        assert_eq!(23, totp.remaining_seconds(157));
    }
}
