pub mod ethereum;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
