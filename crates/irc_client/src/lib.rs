//! Placeholder member carried over from the reference workspace layout. The protocol engine
//! this workspace implements is server-side only; no client is built here.
