//! Domain Layer
//!
//! Pure bookkeeping for the dispatch engine: call ids, request and response
//! records, topic filters, correlation resolvers, the pending-call registry,
//! the timeout queue, subscription bookkeeping and configuration.

pub mod call_id;
pub mod charset;
pub mod config;
pub mod pending;
pub mod request;
pub mod resolver;
pub mod response;
pub mod subscriptions;
pub mod timeout;
pub mod topic;

pub use call_id::CallId;
pub use charset::Charset;
pub use config::DispatcherConfig;
pub use pending::{Completion, PendingRegistry, PendingTask};
pub use request::{Request, RequestBuilder};
pub use resolver::{
    CorrelationResolver, FnResolver, JsonFieldResolver, ResolverChain, TopicFilterResolver,
    TopicResolver,
};
pub use response::{Response, ResponseBody};
pub use subscriptions::{SubscriptionBook, SubscriptionDelta, TopicSubscription};
pub use timeout::TimeoutQueue;
pub use topic::TopicFilter;
