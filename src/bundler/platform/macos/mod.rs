//! macOS: ephemeral signing identities, disk images and the zip side archive.

mod dmg;
mod sign;

pub use dmg::{DmgBuilder, ZipArchiver};
pub use sign::{
    CodeSigningManager, DisposeMode, ROOT_CERTIFICATE_URL, SigningIdentity, parse_common_name,
};
