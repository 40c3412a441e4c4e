mod plain_secret;
mod public;

pub use self::{plain_secret::PlainSecretParams, public::PublicParams};
