use super::BencodeResult;
use super::BencodeValue;
use std::io::Write;
use tracing::instrument;

/// Encodes a byte slice as a bencode string.
///
/// # Example Output
/// For input: b"hello"
/// Output: "5:hello"
#[instrument(skip(writer, s), level = "trace")]
fn encode_string<W: Write>(writer: &mut W, s: &[u8]) -> BencodeResult<()> {
    write!(writer, "{}:", s.len())?;
    writer.write_all(s)?;
    Ok(())
}

/// Encodes an integer as a bencode integer.
///
/// # Example Output
/// For input: 42
/// Output: "i42e"
#[instrument(skip(writer), level = "trace")]
fn encode_integer<W: Write>(writer: &mut W, i: i64) -> BencodeResult<()> {
    write!(writer, "i{}e", i)?;
    Ok(())
}

/// Encodes a slice of BencodeValue as a bencode list.
#[instrument(skip(writer, list), level = "trace")]
fn encode_list<W: Write>(writer: &mut W, list: &[BencodeValue]) -> BencodeResult<()> {
    writer.write_all(b"l")?;
    for item in list {
        encode_value(writer, item)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

/// Encodes a dictionary as a bencode dictionary.
///
/// Canonical encoding requires ascending raw-byte key order; since
/// `BencodeValue::Dict` is a `BTreeMap<Vec<u8>, _>`, iterating it in
/// insertion order already yields that order -- no sort needed here.
#[instrument(skip(writer, dict), level = "trace")]
fn encode_dict<W: Write>(
    writer: &mut W,
    dict: &std::collections::BTreeMap<Vec<u8>, BencodeValue>,
) -> BencodeResult<()> {
    writer.write_all(b"d")?;
    for (key, value) in dict {
        encode_string(writer, key)?;
        encode_value(writer, value)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

/// Encodes a BencodeValue into its bencode representation.
#[instrument(skip(writer), level = "trace")]
fn encode_value<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    match value {
        BencodeValue::String(s) => encode_string(writer, s),
        BencodeValue::Integer(i) => encode_integer(writer, *i),
        BencodeValue::List(list) => encode_list(writer, list),
        BencodeValue::Dict(dict) => encode_dict(writer, dict),
    }
}

/// Public function to encode a BencodeValue into its bencode representation.
#[instrument(skip(writer), level = "debug")]
pub fn encode<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    encode_value(writer, value)
}

/// Convenience wrapper returning the encoded bytes directly; used
/// wherever the canonical encoding is needed as a standalone buffer
/// (e.g. to feed into SHA-1 for the info-hash).
pub fn encode_to_vec(value: &BencodeValue) -> BencodeResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode(&mut buf, value)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decoder::decode;
    use std::collections::BTreeMap;

    #[test]
    fn round_trips_canonical_dict() {
        let input = b"d3:cow3:moo4:spam4:eggse";
        let (value, _) = decode(input).unwrap();
        let encoded = encode_to_vec(&value).unwrap();
        assert_eq!(encoded, input);
    }

    #[test]
    fn dict_encoding_ignores_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert(b"spam".to_vec(), BencodeValue::String(b"eggs".to_vec()));
        a.insert(b"cow".to_vec(), BencodeValue::String(b"moo".to_vec()));

        let mut b = BTreeMap::new();
        b.insert(b"cow".to_vec(), BencodeValue::String(b"moo".to_vec()));
        b.insert(b"spam".to_vec(), BencodeValue::String(b"eggs".to_vec()));

        assert_eq!(
            encode_to_vec(&BencodeValue::Dict(a)).unwrap(),
            encode_to_vec(&BencodeValue::Dict(b)).unwrap(),
        );
    }

    #[test]
    fn encodes_negative_integer() {
        let encoded = encode_to_vec(&BencodeValue::Integer(-42)).unwrap();
        assert_eq!(encoded, b"i-42e");
    }

    #[test]
    fn round_trips_list() {
        let input = b"l5:helloi52ee";
        let (value, _) = decode(input).unwrap();
        assert_eq!(encode_to_vec(&value).unwrap(), input);
    }
}
