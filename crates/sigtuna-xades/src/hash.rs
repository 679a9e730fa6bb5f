#![forbid(unsafe_code)]

//! Reference digest computation: fetch, transform, hash.

use sigtuna_core::Error;
use sigtuna_crypto::digest;
use sigtuna_transforms::{TransformChain, TransformData};

/// Run `input` through the transform chain and hash the resulting bytes
/// with the digest algorithm named by `digest_uri`.
pub fn calculate_hash(
    input: TransformData,
    chain: &TransformChain,
    digest_uri: &str,
) -> Result<Vec<u8>, Error> {
    let out = chain.apply(input)?;
    let bytes = out.to_binary()?;
    digest::digest(digest_uri, &bytes)
}

/// Exact byte equality of two digest values.
pub fn digest_equal(a: &[u8], b: &[u8]) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_core::algorithm;
    use sigtuna_transforms::Transform;

    #[test]
    fn empty_chain_hashes_raw_bytes() {
        let got = calculate_hash(
            TransformData::Binary(b"hello".to_vec()),
            &TransformChain::default(),
            algorithm::SHA256,
        )
        .unwrap();
        let want = digest::digest(algorithm::SHA256, b"hello").unwrap();
        assert!(digest_equal(&got, &want));
    }

    #[test]
    fn chain_changes_the_hashed_bytes() {
        let chain = TransformChain::new(vec![Transform::Canonicalize {
            with_comments: false,
        }]);
        let got = calculate_hash(
            TransformData::Binary(b"<a ><b/></a >".to_vec()),
            &chain,
            algorithm::SHA256,
        )
        .unwrap();
        let want = digest::digest(algorithm::SHA256, b"<a><b></b></a>").unwrap();
        assert!(digest_equal(&got, &want));
    }
}
