use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum UidDecodeError {
    #[error("uid is not valid URL-safe base64")]
    Encoding,

    #[error("uid does not contain a numeric user ID")]
    NotNumeric,
}

/// Encode a user ID for inclusion in a URL.
///
/// The decimal representation of the ID is encoded using the URL-safe base64
/// alphabet. The encoding is deterministic, so the same ID always produces the
/// same string.
pub fn encode_uid(user_id: i64) -> String {
    base64::encode_config(user_id.to_string(), base64::URL_SAFE)
}

/// Reverse [`encode_uid`].
pub fn decode_uid(encoded: &str) -> Result<i64, UidDecodeError> {
    let bytes =
        base64::decode_config(encoded, base64::URL_SAFE).map_err(|_| UidDecodeError::Encoding)?;
    let decimal = String::from_utf8(bytes).map_err(|_| UidDecodeError::NotNumeric)?;

    decimal.parse().map_err(|_| UidDecodeError::NotNumeric)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode_uid(42), encode_uid(42));
        assert_eq!("NDI=", encode_uid(42));
    }

    #[test]
    fn decode_reverses_encode() {
        for user_id in [0, 1, 7, 42, 1_000, 65_535, 123_456_789, i64::MAX] {
            let encoded = encode_uid(user_id);

            assert_eq!(Ok(user_id), decode_uid(&encoded), "uid: {}", encoded);
        }
    }

    #[test]
    fn encode_output_is_url_safe() {
        let encoded = encode_uid(i64::MAX);

        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert_eq!(Err(UidDecodeError::Encoding), decode_uid("not base64!"));
    }

    #[test]
    fn decode_rejects_non_numeric_value() {
        let encoded = base64::encode_config("admin", base64::URL_SAFE);

        assert_eq!(Err(UidDecodeError::NotNumeric), decode_uid(&encoded));
    }
}
