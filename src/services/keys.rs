//! Storage key derivation.

use crate::models::aspect::AspectCategory;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};

const TOKEN_BYTES: usize = 32;
const KEY_EXTENSION: &str = ".mp4";

/// `{category}/{token}.mp4` where `token` is 32 OS-random bytes, base64url
/// encoded without padding.
pub fn derive_key(category: AspectCategory) -> Result<String, rand::Error> {
    derive_key_with(category, &mut OsRng)
}

/// Same as [`derive_key`] with an explicit entropy source.
pub fn derive_key_with<R>(category: AspectCategory, rng: &mut R) -> Result<String, rand::Error>
where
    R: RngCore + ?Sized,
{
    let mut token = [0u8; TOKEN_BYTES];
    rng.try_fill_bytes(&mut token)?;
    Ok(format!(
        "{}/{}{}",
        category.prefix(),
        URL_SAFE_NO_PAD.encode(token),
        KEY_EXTENSION
    ))
}
