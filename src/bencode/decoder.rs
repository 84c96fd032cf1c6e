use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::BTreeMap;
use tracing::instrument;

/// A cursor over a byte slice, tracking how much of the input has been
/// consumed so that `decode` can report it back to the caller.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> BencodeResult<u8> {
        self.input.get(self.pos).copied().ok_or(BencodeError::Truncated)
    }

    fn next(&mut self) -> BencodeResult<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> BencodeResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BencodeError::Truncated)?;
        let slice = self.input.get(self.pos..end).ok_or(BencodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads bytes up to (and consuming) `delimiter`, returning everything
    /// before it as ASCII digits/sign.
    fn read_until(&mut self, delimiter: u8) -> BencodeResult<&'a [u8]> {
        let start = self.pos;
        loop {
            let b = self.next()?;
            if b == delimiter {
                return Ok(&self.input[start..self.pos - 1]);
            }
        }
    }
}

/// Decodes a bencode byte string: `<length>:<bytes>`.
#[instrument(skip(cursor), level = "trace")]
fn decode_string<'a>(cursor: &mut Cursor<'a>) -> BencodeResult<&'a [u8]> {
    let length_bytes = cursor.read_until(b':')?;
    let length_str = std::str::from_utf8(length_bytes)
        .map_err(|_| BencodeError::Malformed("string length is not ASCII".into()))?;
    let length: usize = length_str
        .parse()
        .map_err(|_| BencodeError::InvalidStringLength)?;
    cursor.take(length)
}

/// Decodes a bencode integer: `i<digits>e`, rejecting leading zeros
/// (except the literal `0`) and `-0`.
#[instrument(skip(cursor), level = "trace")]
fn decode_integer(cursor: &mut Cursor<'_>) -> BencodeResult<i64> {
    let first = cursor.next()?;
    if first != b'i' {
        return Err(BencodeError::Malformed("integer must start with 'i'".into()));
    }

    let digits = cursor.read_until(b'e')?;
    let num_str = std::str::from_utf8(digits)
        .map_err(|_| BencodeError::Malformed("integer is not ASCII".into()))?;

    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger);
    }
    let digits_part = num_str.strip_prefix('-').unwrap_or(num_str);
    if digits_part.is_empty() || !digits_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BencodeError::InvalidInteger);
    }
    if digits_part.len() > 1 && digits_part.starts_with('0') {
        return Err(BencodeError::InvalidInteger);
    }

    num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::Overflow(num_str.to_string()))
}

/// Decodes a bencode list: `l<value>*e`.
#[instrument(skip(cursor), level = "trace")]
fn decode_list(cursor: &mut Cursor<'_>) -> BencodeResult<Vec<BencodeValue>> {
    let first = cursor.next()?;
    if first != b'l' {
        return Err(BencodeError::Malformed("list must start with 'l'".into()));
    }

    let mut list = Vec::new();
    loop {
        if cursor.peek()? == b'e' {
            cursor.next()?;
            break;
        }
        list.push(decode_value(cursor)?);
    }
    Ok(list)
}

/// Decodes a bencode dictionary: `d(<string><value>)*e`. Keys must be
/// strictly increasing in lexicographic byte order as they are read --
/// this is a grammar constraint, independent of the ordered map we
/// store the result in.
#[instrument(skip(cursor), level = "trace")]
fn decode_dict(cursor: &mut Cursor<'_>) -> BencodeResult<BTreeMap<Vec<u8>, BencodeValue>> {
    let first = cursor.next()?;
    if first != b'd' {
        return Err(BencodeError::Malformed("dict must start with 'd'".into()));
    }

    let mut dict = BTreeMap::new();
    let mut prev_key: Option<Vec<u8>> = None;

    loop {
        if cursor.peek()? == b'e' {
            cursor.next()?;
            break;
        }

        let key = decode_string(cursor)?.to_vec();
        if let Some(prev) = &prev_key {
            if key <= *prev {
                return Err(BencodeError::Malformed(
                    "dictionary keys must be strictly increasing".into(),
                ));
            }
        }
        let value = decode_value(cursor)?;
        dict.insert(key.clone(), value);
        prev_key = Some(key);
    }

    Ok(dict)
}

#[instrument(skip(cursor), level = "trace")]
fn decode_value(cursor: &mut Cursor<'_>) -> BencodeResult<BencodeValue> {
    match cursor.peek()? {
        b'0'..=b'9' => decode_string(cursor).map(|s| BencodeValue::String(s.to_vec())),
        b'i' => decode_integer(cursor).map(BencodeValue::Integer),
        b'l' => decode_list(cursor).map(BencodeValue::List),
        b'd' => decode_dict(cursor).map(BencodeValue::Dict),
        other => Err(BencodeError::Malformed(format!(
            "unexpected byte '{}'",
            other as char
        ))),
    }
}

/// Decodes one bencode value from the start of `input`, returning the
/// value together with the number of bytes consumed so the caller can
/// detect (or ignore) trailing data.
#[instrument(skip(input), level = "debug")]
pub fn decode(input: &[u8]) -> BencodeResult<(BencodeValue, usize)> {
    let mut cursor = Cursor::new(input);
    let value = decode_value(&mut cursor)?;
    Ok((value, cursor.pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&[u8], BencodeValue)]) -> BencodeValue {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_vec(), v.clone());
        }
        BencodeValue::Dict(map)
    }

    #[test]
    fn decodes_string() {
        let (v, consumed) = decode(b"5:hello").unwrap();
        assert_eq!(v, BencodeValue::String(b"hello".to_vec()));
        assert_eq!(consumed, 7);
    }

    #[test]
    fn decodes_zero_length_string() {
        let (v, _) = decode(b"0:").unwrap();
        assert_eq!(v, BencodeValue::String(Vec::new()));
    }

    #[test]
    fn decodes_positive_integer() {
        let (v, _) = decode(b"i52e").unwrap();
        assert_eq!(v, BencodeValue::Integer(52));
    }

    #[test]
    fn decodes_negative_integer() {
        let (v, _) = decode(b"i-42e").unwrap();
        assert_eq!(v, BencodeValue::Integer(-42));
    }

    #[test]
    fn decodes_zero() {
        let (v, _) = decode(b"i0e").unwrap();
        assert_eq!(v, BencodeValue::Integer(0));
    }

    #[test]
    fn rejects_negative_zero() {
        assert!(matches!(decode(b"i-0e"), Err(BencodeError::InvalidInteger)));
    }

    #[test]
    fn rejects_leading_zero() {
        assert!(matches!(decode(b"i01e"), Err(BencodeError::InvalidInteger)));
    }

    #[test]
    fn rejects_empty_integer() {
        assert!(matches!(decode(b"ie"), Err(BencodeError::InvalidInteger)));
    }

    #[test]
    fn rejects_unterminated_integer() {
        assert!(decode(b"i42").is_err());
    }

    #[test]
    fn decodes_list() {
        let (v, _) = decode(b"l5:helloi52ee").unwrap();
        assert_eq!(
            v,
            BencodeValue::List(vec![
                BencodeValue::String(b"hello".to_vec()),
                BencodeValue::Integer(52),
            ])
        );
    }

    #[test]
    fn decodes_dict() {
        let (v, _) = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
        assert_eq!(
            v,
            dict(&[
                (b"cow", BencodeValue::String(b"moo".to_vec())),
                (b"spam", BencodeValue::String(b"eggs".to_vec())),
            ])
        );
    }

    #[test]
    fn rejects_out_of_order_keys() {
        assert!(decode(b"d4:spam4:eggs3:cow3:mooe").is_err());
    }

    #[test]
    fn rejects_duplicate_keys() {
        assert!(decode(b"d3:cow3:moo3:cow3:mooe").is_err());
    }

    #[test]
    fn rejects_length_prefix_past_end() {
        assert!(matches!(decode(b"10:short"), Err(BencodeError::Truncated)));
    }
}
