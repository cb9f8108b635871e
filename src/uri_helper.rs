use std::{borrow::Cow, str::FromStr};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::secret::{decode_secret, encode_secret};
use crate::totp::Totp;
use crate::{OtpError, OtpHashAlgorithm};

const TOTP_TYPE: &str = "totp";

const URI_SECRET_QUERY: &str = "secret";
const URI_ISSUER_QUERY: &str = "issuer";
const URI_HASH_QUERY: &str = "algorithm";
const URI_PERIOD_QUERY: &str = "period";
const URI_DIGITS_QUERY: &str = "digits";

/// Escapes everything outside the RFC3986 unreserved set, so spaces come
/// out as `%20` (never `+`) and `@` as `%40`, the forms authenticator
/// apps expect in label components.
const COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT_SET).to_string()
}

/// Renders the `otpauth://totp/<issuer>:<account>?...` provisioning URI
/// for a config.
///
/// The secret is decoded and re-encoded so the URI always carries the
/// canonical unpadded base32 form, whatever spacing or casing the stored
/// copy uses. Query parameters appear in the fixed order secret, issuer,
/// algorithm, digits, period.
pub fn build_totp_uri(totp: &Totp, issuer: &str, account: &str) -> Result<String, OtpError> {
    let secret = encode_secret(&decode_secret(totp.secret.as_str())?);

    let issuer_component = component(issuer);
    let account_component = component(account);

    Ok(format!(
        "otpauth://{TOTP_TYPE}/{issuer_component}:{account_component}\
         ?{URI_SECRET_QUERY}={secret}\
         &{URI_ISSUER_QUERY}={issuer_component}\
         &{URI_HASH_QUERY}={algorithm}\
         &{URI_DIGITS_QUERY}={digits}\
         &{URI_PERIOD_QUERY}={period}",
        algorithm = totp.algorithm,
        digits = totp.digits,
        period = totp.period,
    ))
}

/// Reads a TOTP config back out of a provisioning URI.
///
/// Values run through the same validation as manual configuration, so a
/// URI advertising 9 digits or a zero period is rejected rather than
/// silently accepted.
pub fn totp_from_uri(uri: &str) -> Result<Totp, OtpError> {
    let uri = url::Url::parse(uri).map_err(OtpError::UriParseError)?;

    let domain = uri.domain();
    if domain.is_none() || domain.is_some_and(|d| d != TOTP_TYPE) {
        return Err(OtpError::InvalidUriType(domain.unwrap_or("None").into()));
    }

    let mut secret = "".to_string();
    let mut algorithm = OtpHashAlgorithm::default();
    let mut period = 30;
    let mut digits = 6;

    for params in uri.query_pairs() {
        match params.0 {
            Cow::Borrowed(URI_SECRET_QUERY) => secret = params.1.to_string(),
            Cow::Borrowed(URI_HASH_QUERY) => {
                algorithm = OtpHashAlgorithm::from_str(params.1.as_ref())?
            }
            Cow::Borrowed(URI_PERIOD_QUERY) => {
                period = u64::from_str(params.1.as_ref())
                    .map_err(|e| OtpError::IntegerParseError(e, URI_PERIOD_QUERY.into()))?
            }
            Cow::Borrowed(URI_DIGITS_QUERY) => {
                digits = u32::from_str(params.1.as_ref())
                    .map_err(|e| OtpError::IntegerParseError(e, URI_DIGITS_QUERY.into()))?
            }
            _ => (),
        }
    }

    if secret.is_empty() {
        return Err(OtpError::UriMissingSecret);
    }

    let mut totp = Totp::new(secret);
    totp.with_algorithm(algorithm)
        .with_digits(digits)?
        .with_period(period)?;

    Ok(totp)
}
