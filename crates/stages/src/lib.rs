//! # The six pipeline stages, plus the `Source`/`Destination` chain owners
//!
//! `input`/`demuxer`/`decoder`/`filter` make up the pull chain a [`Source`]
//! owns (§4.11); `filter`/`encoder`/[`muxers::Muxer`]/`output` make up the
//! push chain a [`Destination`] owns (§4.12). [`sourcelist`]/
//! [`destinationlist`] are the thread-owning collections §5 describes.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod decoder;
pub mod destination;
pub mod destinationlist;
pub mod encoder;
pub mod filter;
pub mod input;
pub mod registries;
pub mod source;
pub mod sourcelist;
pub mod demuxer;

pub use destination::Destination;
pub use destinationlist::DestinationList;
pub use source::Source;
pub use sourcelist::SourceList;
