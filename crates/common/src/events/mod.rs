//! In-process event bus
//!
//! Components publish typed events and subscribe either with an
//! [`EventListener`] callback or a [`Subscription`] channel. The bus is
//! generic over the event kind, the component identity and the payload so
//! each domain can bring its own closed enums.

mod bus;

pub use bus::{EventBus, EventListener, ListenerId, Subscription};
