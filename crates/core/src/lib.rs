//! Core types for the persona conversation pipeline
//!
//! This crate provides the types shared by every other crate:
//! - Conversation messages with tagged content (text / parts)
//! - The client-facing event contract (duplex channel payloads)
//! - Persona definitions
//! - The vision-image slot and its freshness policies
//! - The interrupt/barge-in coordinator and per-turn cancellation handle
//! - Error types

pub mod error;
pub mod events;
pub mod interrupt;
pub mod message;
pub mod persona;
pub mod purchase;
pub mod vision;

pub use error::{Error, Result};
pub use events::{
    ClientEvent, EventSender, InboundEvent, InterruptionKind, Product, StyleGenerationKind,
    StyleGenerationPayload,
};
pub use interrupt::{InterruptCoordinator, TurnHandle};
pub use message::{Content, Message, Part, Role, StoredMessage, IMAGE_REMOVED_PLACEHOLDER};
pub use persona::{Persona, PersonaCategory, ReferenceOutfit};
pub use purchase::PurchaseFlowStatus;
pub use vision::VisionImage;
