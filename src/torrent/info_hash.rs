use crate::bencode;
use crate::bencode::BencodeValue;
use crate::torrent::TorrentResult;
use sha1::Digest;
use sha1::Sha1;
use std::collections::BTreeMap;

/// Calculates the SHA-1 hash of the canonical bencode encoding of the
/// `info` sub-dictionary.
///
/// The dictionary is re-encoded rather than hashed from its original
/// byte range in the source file: canonical re-encoding is what makes
/// the info-hash stable regardless of how the surrounding value was
/// represented in memory.
///
/// # Example
/// ```
/// use std::collections::BTreeMap;
/// use rs_torrent_client::bencode::BencodeValue;
/// use rs_torrent_client::torrent::info_hash::calculate_info_hash;
///
/// let mut info = BTreeMap::new();
/// info.insert(b"length".to_vec(), BencodeValue::Integer(12));
/// let hash = calculate_info_hash(&info).unwrap();
/// assert_eq!(hash.len(), 20);
/// ```
pub fn calculate_info_hash(info_dict: &BTreeMap<Vec<u8>, BencodeValue>) -> TorrentResult<[u8; 20]> {
    let buffer = bencode::encoder::encode_to_vec(&BencodeValue::Dict(info_dict.clone()))?;

    let mut hasher = Sha1::new();
    hasher.update(&buffer);

    let result = hasher.finalize();
    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&result[..]);

    Ok(info_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stable_regardless_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert(b"length".to_vec(), BencodeValue::Integer(12));
        a.insert(b"name".to_vec(), BencodeValue::String(b"x".to_vec()));

        let mut b = BTreeMap::new();
        b.insert(b"name".to_vec(), BencodeValue::String(b"x".to_vec()));
        b.insert(b"length".to_vec(), BencodeValue::Integer(12));

        assert_eq!(calculate_info_hash(&a).unwrap(), calculate_info_hash(&b).unwrap());
    }

    #[test]
    fn matches_direct_encoding() {
        let mut info = BTreeMap::new();
        info.insert(b"length".to_vec(), BencodeValue::Integer(12));
        info.insert(b"name".to_vec(), BencodeValue::String(b"x".to_vec()));
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(16384));
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![0u8; 20]));

        let encoded = bencode::encoder::encode_to_vec(&BencodeValue::Dict(info.clone())).unwrap();
        let mut hasher = Sha1::new();
        hasher.update(&encoded);
        let expected = hasher.finalize();

        assert_eq!(&calculate_info_hash(&info).unwrap()[..], &expected[..]);
    }
}
