mod client;

pub use client::GcsClient;
