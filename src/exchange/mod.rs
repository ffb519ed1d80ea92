//! Irregular collective exchanges.
//!
//! Every rank of the group calls the same exchange with its own plan. The
//! variants differ in how much of the plan is known up front:
//!
//! | Method | Known up front | Extra rounds |
//! |--------|----------------|--------------|
//! | [`Exchanger::negotiated`] | what I send | receive counts via the resolver |
//! | [`Exchanger::symmetric`] | what I send; receive sizes mirror it | none |
//! | [`Exchanger::with_offsets`] | send and receive layout as offsets | none |
//! | [`Exchanger::known_partners`] | who I talk to | one count round with partners |
//! | [`Exchanger::with_callbacks`] | who I talk to; receive sizes mirror sends | none |
//!
//! Each data round posts every receive, meets at a barrier, issues every
//! send and then retires everything. Peers with nothing to move get no
//! message at all.
//!
//! # Example
//!
//! ```
//! use commwire::exchange::Exchanger;
//! use commwire::transport::{LocalGroup, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> commwire::Result<()> {
//! let received = LocalGroup::run(3, |t| async move {
//!     let exchanger = Exchanger::new(&t);
//!     // rank r sends r copies of its rank to every peer
//!     let send_lists = vec![vec![t.rank() as u32; t.rank()]; t.size()];
//!     let recv_lists = exchanger.negotiated(&send_lists).await?;
//!     Ok(recv_lists)
//! })
//! .await?;
//!
//! assert_eq!(received[0], vec![vec![], vec![1], vec![2, 2]]);
//! # Ok(())
//! # }
//! ```

mod callback;
mod config;
mod negotiated;
mod offsets;
mod resolver;
mod round;
mod symmetric;
pub mod tags;

pub use callback::Completion;
pub use config::{ExchangeConfig, TagSet};
pub use resolver::{DenseResolver, ReceiveListResolver};

pub(crate) use resolver::all_gather;

use crate::codec::Element;
use crate::error::{CommError, Result};
use crate::transport::Transport;

/// Runs exchanges over one transport with one configuration.
pub struct Exchanger<'t> {
    transport: &'t dyn Transport,
    config: ExchangeConfig,
    resolver: Box<dyn ReceiveListResolver>,
}

impl<'t> Exchanger<'t> {
    /// Exchanger with the default configuration and a [`DenseResolver`].
    pub fn new(transport: &'t dyn Transport) -> Self {
        let config = ExchangeConfig::default();
        Self {
            transport,
            resolver: Box::new(DenseResolver::new(config.tags.resolver)),
            config,
        }
    }

    /// Start configuring an exchanger.
    pub fn builder(transport: &'t dyn Transport) -> ExchangerBuilder<'t> {
        ExchangerBuilder::new(transport)
    }

    /// The transport every exchange runs on.
    pub fn transport(&self) -> &'t dyn Transport {
        self.transport
    }

    /// Active configuration.
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn verify(&self) -> bool {
        self.config.verify_sizes
    }

    /// Require one entry per rank.
    fn check_per_rank<T>(&self, what: &str, lists: &[T]) -> Result<()> {
        let size = self.transport.size();
        if lists.len() != size {
            return Err(CommError::InvalidPlan(format!(
                "{} has {} entries for a group of {}",
                what,
                lists.len(),
                size
            )));
        }
        Ok(())
    }
}

/// Builder for [`Exchanger`].
///
/// ```
/// use commwire::exchange::{Exchanger, TagSet};
/// use commwire::transport::LocalGroup;
///
/// let group = LocalGroup::new(1);
/// let exchanger = Exchanger::builder(&group[0])
///     .tags(TagSet { symmetric: 1, ..TagSet::default() })
///     .verify_sizes(true)
///     .build()
///     .unwrap();
/// assert_eq!(exchanger.config().tags.symmetric, 1);
/// ```
pub struct ExchangerBuilder<'t> {
    transport: &'t dyn Transport,
    config: ExchangeConfig,
    resolver: Option<Box<dyn ReceiveListResolver>>,
}

impl<'t> ExchangerBuilder<'t> {
    /// Create a new builder with default settings.
    pub fn new(transport: &'t dyn Transport) -> Self {
        Self {
            transport,
            config: ExchangeConfig::default(),
            resolver: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the tag set.
    pub fn tags(mut self, tags: TagSet) -> Self {
        self.config.tags = tags;
        self
    }

    /// Turn received-length assertions on or off.
    pub fn verify_sizes(mut self, verify: bool) -> Self {
        self.config.verify_sizes = verify;
        self
    }

    /// Use a custom resolver for [`Exchanger::negotiated`].
    ///
    /// Default: [`DenseResolver`] on the configured resolver tag.
    pub fn resolver(mut self, resolver: impl ReceiveListResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Validate the configuration and build the exchanger.
    pub fn build(self) -> Result<Exchanger<'t>> {
        self.config.validate()?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Box::new(DenseResolver::new(self.config.tags.resolver)));
        Ok(Exchanger {
            transport: self.transport,
            config: self.config,
            resolver,
        })
    }
}

/// Encoded byte length of every list.
fn byte_lens<T: Element>(lists: &[Vec<T>]) -> Vec<usize> {
    lists.iter().map(|list| list.len() * T::WIDTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalGroup;

    #[test]
    fn test_builder_defaults() {
        let group = LocalGroup::new(2);
        let exchanger = Exchanger::builder(&group[1]).build().unwrap();
        assert_eq!(exchanger.config(), &ExchangeConfig::default());
        assert_eq!(exchanger.transport().rank(), 1);
    }

    #[test]
    fn test_builder_rejects_duplicate_tags() {
        let group = LocalGroup::new(1);
        let tags = TagSet {
            callbacks: tags::SYMMETRIC,
            ..TagSet::default()
        };
        let result = Exchanger::builder(&group[0]).tags(tags).build();
        assert!(matches!(result, Err(CommError::InvalidConfig(_))));
    }

    #[test]
    fn test_check_per_rank() {
        let group = LocalGroup::new(3);
        let exchanger = Exchanger::new(&group[0]);
        assert!(exchanger.check_per_rank("lists", &[(), (), ()]).is_ok());
        assert!(matches!(
            exchanger.check_per_rank("lists", &[()]),
            Err(CommError::InvalidPlan(_))
        ));
    }
}
