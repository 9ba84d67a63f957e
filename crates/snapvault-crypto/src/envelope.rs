//! Data key envelope: wrap, unwrap and rotate data keys under a master key
//!
//! A wrapped data key is an ordinary one-shot record:
//! ```text
//! [24 bytes: random nonce][32 bytes: encrypted data key][16 bytes: tag]
//! ```

use zeroize::Zeroize;

use crate::aead::{decrypt_bytes, encrypt_bytes};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{DataKey, MasterKey};
use crate::KEY_SIZE;

/// Wrap (encrypt) a data key under the master key with a one-shot random nonce.
pub fn wrap_data_key(data_key: &DataKey, master: &MasterKey) -> CryptoResult<Vec<u8>> {
    encrypt_bytes(data_key.as_bytes(), master.as_bytes())
}

/// Unwrap (decrypt) a data key. Fails with `AuthenticationFailed` on a wrong master key.
pub fn unwrap_data_key(wrapped: &[u8], master: &MasterKey) -> CryptoResult<DataKey> {
    let mut plaintext = decrypt_bytes(wrapped, master.as_bytes())?;

    if plaintext.len() != KEY_SIZE {
        let len = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::InvalidKey(format!(
            "unwrapped data key has wrong size: {len} bytes (expected {KEY_SIZE})"
        )));
    }

    let key = DataKey::from_slice(&plaintext);
    plaintext.zeroize();
    key
}

/// Move a wrapped data key from `old` to `new`.
///
/// - opens under `old`: re-wrapped under `new`
/// - opens only under `new`: already migrated, returned unchanged
/// - opens under neither: `RotationFailed` carrying the `old` failure
///
/// Applying this twice yields the same result as applying it once, so an
/// interrupted rotation can simply be run again.
pub fn rewrap(wrapped: &[u8], old: &MasterKey, new: &MasterKey) -> CryptoResult<Vec<u8>> {
    match unwrap_data_key(wrapped, old) {
        Ok(data_key) => wrap_data_key(&data_key, new),
        Err(old_err) => match unwrap_data_key(wrapped, new) {
            Ok(_) => Ok(wrapped.to_vec()),
            Err(_) => Err(CryptoError::RotationFailed(Box::new(old_err))),
        },
    }
}

/// Build the per-object conversion used by key rotation.
pub fn rewrap_converter(
    old: MasterKey,
    new: MasterKey,
) -> impl Fn(&[u8]) -> CryptoResult<Vec<u8>> {
    move |wrapped: &[u8]| rewrap(wrapped, &old, &new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WRAPPED_KEY_SIZE;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_key_wrap_unwrap_roundtrip() {
        let master = test_master_key();
        let data_key = DataKey::generate();

        let wrapped = wrap_data_key(&data_key, &master).unwrap();
        let unwrapped = unwrap_data_key(&wrapped, &master).unwrap();

        assert_eq!(data_key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_wrapped_key_size() {
        let wrapped = wrap_data_key(&DataKey::generate(), &test_master_key()).unwrap();

        // nonce (24) + key (32) + tag (16) = 72
        assert_eq!(wrapped.len(), WRAPPED_KEY_SIZE);
    }

    #[test]
    fn test_wrapping_twice_uses_fresh_nonces() {
        let master = test_master_key();
        let data_key = DataKey::generate();

        let a = wrap_data_key(&data_key, &master).unwrap();
        let b = wrap_data_key(&data_key, &master).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_unwrap_wrong_master() {
        let master1 = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let master2 = MasterKey::from_bytes([2u8; KEY_SIZE]);

        let wrapped = wrap_data_key(&DataKey::generate(), &master1).unwrap();
        let result = unwrap_data_key(&wrapped, &master2);

        assert_eq!(result.unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_unwrap_rejects_non_key_payload() {
        let master = test_master_key();
        let wrapped = encrypt_bytes(b"sixteen byte val", master.as_bytes()).unwrap();

        let result = unwrap_data_key(&wrapped, &master);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_rewrap_moves_key_to_new_master() {
        let old = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let new = MasterKey::from_bytes([2u8; KEY_SIZE]);
        let data_key = DataKey::generate();
        let wrapped = wrap_data_key(&data_key, &old).unwrap();

        let rotated = rewrap(&wrapped, &old, &new).unwrap();

        assert!(unwrap_data_key(&rotated, &old).is_err());
        let unwrapped = unwrap_data_key(&rotated, &new).unwrap();
        assert_eq!(unwrapped.as_bytes(), data_key.as_bytes());
    }

    #[test]
    fn test_rewrap_leaves_migrated_key_untouched() {
        let old = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let new = MasterKey::from_bytes([2u8; KEY_SIZE]);
        let wrapped = wrap_data_key(&DataKey::generate(), &old).unwrap();

        let once = rewrap(&wrapped, &old, &new).unwrap();
        let twice = rewrap(&once, &old, &new).unwrap();

        assert_eq!(once, twice, "second rotation must be a no-op");
    }

    #[test]
    fn test_rewrap_unknown_master_fails() {
        let old = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let new = MasterKey::from_bytes([2u8; KEY_SIZE]);
        let other = MasterKey::from_bytes([3u8; KEY_SIZE]);
        let wrapped = wrap_data_key(&DataKey::generate(), &other).unwrap();

        let result = rewrap(&wrapped, &old, &new);
        assert_eq!(
            result,
            Err(CryptoError::RotationFailed(Box::new(
                CryptoError::AuthenticationFailed
            )))
        );
    }

    #[test]
    fn test_rewrap_converter() {
        let old = MasterKey::from_bytes([1u8; KEY_SIZE]);
        let new = MasterKey::from_bytes([2u8; KEY_SIZE]);
        let data_key = DataKey::generate();
        let wrapped = wrap_data_key(&data_key, &old).unwrap();

        let convert = rewrap_converter(old, new.clone());
        let rotated = convert(&wrapped).unwrap();

        let unwrapped = unwrap_data_key(&rotated, &new).unwrap();
        assert_eq!(unwrapped.as_bytes(), data_key.as_bytes());
    }
}
