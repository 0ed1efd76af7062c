use crate::ConvertError;
use crate::Result;

/// Encodes a metadata value for storage in a coordination node.
///
/// Values cross the adapter boundary as their UTF-8 byte encoding.
pub fn string_to_bytes(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

/// Decodes a coordination node payload back into a metadata value.
///
/// Fails with [`ConvertError::InvalidUtf8`] when a foreign writer stored
/// bytes that are not valid UTF-8.
pub fn bytes_to_string(bytes: Vec<u8>) -> Result<String> {
    Ok(String::from_utf8(bytes).map_err(ConvertError::from)?)
}
