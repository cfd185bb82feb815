use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use derivative::Derivative;
use typed_builder::TypedBuilder;

use crate::buf_pair::BufPair;
use crate::context::Context;
use crate::error::BoxError;
use crate::variables::Variables;

/// A source of response bytes for a single fetch.
///
/// Implementations write response data into `buf.data` and any
/// already-encoded GraphQL error objects into `buf.errors`. The returned
/// error covers transport-level failure only; GraphQL-level errors belong
/// in the buffer.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(
        &self,
        ctx: &Context<'_>,
        input: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), BoxError>;

    /// Stable identity used to coalesce identical concurrent fetches.
    fn unique_identifier(&self) -> &[u8];
}

/// A fetch attached to an object node, populating that object's result set.
#[derive(Clone, Debug, PartialEq)]
pub enum Fetch {
    Single(SingleFetch),
    Parallel(ParallelFetch),
}

#[derive(Clone, Derivative, TypedBuilder)]
#[derivative(Debug)]
pub struct SingleFetch {
    /// Result-set slot this fetch writes into.
    #[builder(default)]
    pub buffer_id: usize,
    /// Input template; `$$N$$` markers are substituted per request.
    pub input: Bytes,
    #[derivative(Debug = "ignore")]
    pub data_source: Arc<dyn DataSource>,
    #[builder(default)]
    pub variables: Variables,
}

impl PartialEq for SingleFetch {
    fn eq(&self, other: &Self) -> bool {
        self.buffer_id == other.buffer_id
            && self.input == other.input
            && Arc::ptr_eq(&self.data_source, &other.data_source)
            && self.variables == other.variables
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParallelFetch {
    pub fetches: Vec<SingleFetch>,
}

/// Fetches collected during planning.
#[derive(Clone, Debug, Default)]
pub struct Fetches(Vec<Fetch>);

impl Fetches {
    pub fn append_if_unique(&mut self, fetch: Fetch) {
        if !self.0.contains(&fetch) {
            self.0.push(fetch);
        }
    }

    pub fn as_slice(&self) -> &[Fetch] {
        &self.0
    }
}
