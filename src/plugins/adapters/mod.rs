// Site adapter implementations
pub mod disneystore;
pub mod sfcc;

pub use disneystore::DisneyStoreAdapter;
pub use sfcc::SfccGridAdapter;
