pub mod config;
pub mod domain;
pub mod errors;
pub mod period;
pub mod text;

pub use domain::activity::UserActivity;
pub use domain::agenda::{AgendaCategory, AgendaItem, AgendaItemId, NewAgendaItem};
pub use domain::chat::{ChatFile, ChatMessage};
pub use domain::credential::OAuthToken;
pub use domain::portfolio::{CompanyRecord, PipelineDeal, PortfolioChannel};
pub use domain::summary::SummaryCacheEntry;
pub use errors::{ApplicationError, DomainError, InterfaceError};
