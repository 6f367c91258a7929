//! Polyphony for Cadenza.
//!
//! - **[`VoicePool`]** - owns a set of voices and hands them out on demand
//! - **[`AllocationStrategy`]** - picks the next voice: [`RoundRobin`] or
//!   [`LeastRecentlyUsed`] (with stealing)
//! - **[`Voice`]** - capability a pool needs from a voice, implemented by
//!   [`ProcessingNode`](cadenza_core::ProcessingNode)
//! - **[`tone_voice`]** - sine voice unit with a release tail
//!
//! # Quick Start
//!
//! ```ignore
//! use cadenza_core::{AudioContext, EngineConfig, NodeCommand};
//! use cadenza_synth::{tone_pool, LeastRecentlyUsed, Voice};
//!
//! let (ctx, mut renderer) = AudioContext::new(EngineConfig::default())?;
//! let mut pool = tone_pool(&ctx, 8, LeastRecentlyUsed::new())?;
//! pool.apply_to_all(|v| { let _ = Voice::connect(v, ctx.destination()); });
//!
//! if let Some(key) = pool.allocate_node() {
//!     pool.voice(key).unwrap().post(NodeCommand::Start)?;
//! }
//! ```

pub mod error;
pub use error::{Error, Result};

mod voice;
pub use voice::Voice;

mod strategy;
pub use strategy::{AllocationStrategy, LeastRecentlyUsed, PoolTiers, RoundRobin};

mod pool;
pub use pool::{Allocation, VoiceKey, VoicePool, VoiceState};

mod tone;
pub use tone::{tone_pool, tone_voice, TONE_VOICE};
