pub mod certificate;
pub mod find;
