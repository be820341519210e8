#![forbid(unsafe_code)]

pub mod api;
pub mod checkpoint;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod engagement;
pub mod error;
pub mod media_host;
pub mod playlists;
pub mod rpc;
pub mod sampler;
pub mod sprites;
pub mod store;
pub mod uploader;
