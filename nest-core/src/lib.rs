//! # nest-core: the two-person companion app over `nest-store`
//!
//! Typed services for everything the app keeps in its document store:
//!
//! | Service          | Document                          |
//! |------------------|-----------------------------------|
//! | [`Profiles`]     | `users/{code}`                    |
//! | [`Chat`]         | `chats/812_917`                   |
//! | [`Anniversaries`]| `anniversaries/812_917`           |
//! | [`TimesToDo`]    | `timesToDo/812_917`               |
//!
//! [`AuthService`] gates access to exactly two members ([`Member`]) sharing
//! one secret. [`NestApp`] wires storage, accounts and services together.

pub mod anniversary;
pub mod app;
pub mod auth;
pub mod chat;
pub mod couple;
pub mod error;
mod items;
pub mod profile;
pub mod times;

pub use anniversary::{Anniversaries, Anniversary, Countdown};
pub use app::{Backend, NestApp, NestConfig};
pub use auth::{Accounts, AuthService, AuthSubscription, AuthUser, Session};
pub use chat::{Chat, ChatMessage, TimelineEntry};
pub use couple::Member;
pub use error::NestError;
pub use profile::{seed_couple, Profiles, UserProfile};
pub use times::{TimesItem, TimesToDo};
