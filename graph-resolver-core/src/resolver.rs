use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::io::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use fxhash::FxHasher64;
use tokio::sync::watch;

use crate::buf_pair::BufPair;
use crate::context::Context;
use crate::error::{FetchError, ResolveError};
use crate::fetch::{Fetch, SingleFetch};
use crate::json_ext::{self, JsonKind};
use crate::pool::Pool;
use crate::shape::{Array, GraphQLResponse, Node, Object, ScalarField};
use crate::variables::resolve_variables;

const INITIAL_BUF_CAPACITY: usize = 1024;
const INITIAL_SLICE_CAPACITY: usize = 24;

/// Drives planned response shapes against their data sources and streams
/// one GraphQL response envelope per call.
///
/// A resolver is shared across requests: buffer reuse and in-flight fetch
/// coalescing span every concurrent
/// [`resolve_graphql_response`](Resolver::resolve_graphql_response) call.
pub struct Resolver {
    buf_pairs: Pool<BufPair>,
    buf_pair_slices: Pool<Vec<BufPair>>,
    inflight_fetches: Mutex<HashMap<u64, InflightReceiver>>,
}

type InflightReceiver = watch::Receiver<Option<Arc<InflightResult>>>;

/// Published outcome of a leader fetch, replayed to every coalesced
/// follower. Followers hold the record through the `Arc`, so it stays
/// readable after the in-flight entry is gone.
#[derive(Debug)]
struct InflightResult {
    data: Bytes,
    errors: Bytes,
    err: Option<String>,
}

/// Buffers populated by the fetches of a single object, keyed by buffer id.
#[derive(Debug, Default)]
struct ResultSet {
    buffers: BTreeMap<usize, BufPair>,
}

/// Removes the in-flight entry for a leader fetch, including when the
/// leader future is dropped mid-load.
struct InflightGuard<'a> {
    resolver: &'a Resolver,
    fetch_id: u64,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.resolver
            .inflight_fetches
            .lock()
            .expect("inflight mutex poisoned; qed")
            .remove(&self.fetch_id);
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            buf_pairs: Pool::new(
                || BufPair::with_capacity(INITIAL_BUF_CAPACITY),
                BufPair::reset,
            ),
            buf_pair_slices: Pool::new(
                || Vec::with_capacity(INITIAL_SLICE_CAPACITY),
                Vec::clear,
            ),
            inflight_fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `response` against `data` and write the envelope to
    /// `writer`.
    ///
    /// On failure the sink may already contain partial output; nothing is
    /// rolled back.
    #[tracing::instrument(skip_all, level = "trace")]
    pub async fn resolve_graphql_response<W>(
        &self,
        ctx: &Context<'_>,
        response: &GraphQLResponse,
        data: &[u8],
        writer: &mut W,
    ) -> Result<(), ResolveError>
    where
        W: Write + Send,
    {
        let mut buf = self.buf_pairs.get();
        let result = self.resolve_node(ctx, &response.data, data, &mut buf).await;
        let result = result.and_then(|()| write_envelope(&buf, writer));
        self.buf_pairs.put(buf);
        result
    }

    fn resolve_node<'a>(
        &'a self,
        ctx: &'a Context<'a>,
        node: &'a Node,
        data: &'a [u8],
        buf: &'a mut BufPair,
    ) -> BoxFuture<'a, Result<(), ResolveError>> {
        Box::pin(async move {
            match node {
                Node::Object(object) => self.resolve_object(ctx, object, data, buf).await,
                Node::Array(array) => self.resolve_array(ctx, array, data, buf).await,
                Node::Null => {
                    buf.data.extend_from_slice(b"null");
                    Ok(())
                }
                Node::EmptyObject => {
                    buf.data.extend_from_slice(b"{}");
                    Ok(())
                }
                Node::EmptyArray => {
                    buf.data.extend_from_slice(b"[]");
                    Ok(())
                }
                Node::String(field) => self.resolve_string(field, data, buf),
                Node::Boolean(field) => self.resolve_scalar(field, JsonKind::Boolean, data, buf),
                Node::Integer(field) => self.resolve_scalar(field, JsonKind::Number, data, buf),
                Node::Float(field) => self.resolve_scalar(field, JsonKind::Number, data, buf),
            }
        })
    }

    async fn resolve_object(
        &self,
        ctx: &Context<'_>,
        object: &Object,
        data: &[u8],
        object_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        let data = if object.path.is_empty() {
            data
        } else {
            match json_ext::extract(data, &object.path) {
                Ok((slice, _)) => slice,
                Err(_) => &[],
            }
        };

        let mut set = None;
        if let Some(fetch) = &object.fetch {
            let mut result_set = ResultSet::default();
            if let Err(err) = self.resolve_fetch(ctx, fetch, data, &mut result_set).await {
                failfast_error!("fetch failed, resolving from its error buffer: {}", err);
            }
            // Fetch errors reach the caller before any field body does.
            for buf in result_set.buffers.values_mut() {
                object_buf.merge_errors(buf);
            }
            set = Some(result_set);
        }

        let mut field_buf = self.buf_pairs.get();
        let result = self
            .resolve_object_field_sets(ctx, object, data, set.as_ref(), &mut field_buf, object_buf)
            .await;
        self.buf_pairs.put(field_buf);
        if let Some(set) = set {
            self.free_result_set(set);
        }
        result
    }

    async fn resolve_object_field_sets(
        &self,
        ctx: &Context<'_>,
        object: &Object,
        data: &[u8],
        set: Option<&ResultSet>,
        field_buf: &mut BufPair,
        object_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        let mut type_name_skip = false;
        let mut first = true;
        for field_set in &object.field_sets {
            let field_set_data = match set {
                Some(set) if field_set.has_buffer => match set.buffers.get(&field_set.buffer_id) {
                    Some(buffer) => &buffer.data[..],
                    None => data,
                },
                _ => data,
            };

            if let Some(on_type_name) = &field_set.on_type_name {
                let matches = match json_ext::extract(field_set_data, &["__typename"]) {
                    Ok((type_name, _)) => type_name == &on_type_name[..],
                    Err(_) => false,
                };
                if !matches {
                    type_name_skip = true;
                    continue;
                }
            }

            for field in &field_set.fields {
                if first {
                    object_buf.data.extend_from_slice(b"{");
                    first = false;
                } else {
                    object_buf.data.extend_from_slice(b",");
                }
                object_buf.data.extend_from_slice(b"\"");
                object_buf.data.extend_from_slice(&field.name);
                object_buf.data.extend_from_slice(b"\":");
                match self
                    .resolve_node(ctx, &field.value, field_set_data, field_buf)
                    .await
                {
                    Ok(()) => {}
                    Err(ResolveError::NonNullableFieldIsNull) if object.nullable => {
                        object_buf.data.clear();
                        object_buf.data.extend_from_slice(b"null");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
                // Sibling commas come from the object writer above, never
                // from the merge.
                object_buf.merge(field_buf, false);
            }
        }
        if first {
            if !object.nullable {
                if type_name_skip {
                    return Err(ResolveError::TypeNameSkipped);
                }
                return Err(ResolveError::NonNullableFieldIsNull);
            }
            object_buf.data.extend_from_slice(b"null");
            return Ok(());
        }
        object_buf.data.extend_from_slice(b"}");
        Ok(())
    }

    async fn resolve_array(
        &self,
        ctx: &Context<'_>,
        array: &Array,
        data: &[u8],
        array_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        let mut items = Vec::new();
        if let Err(err) = json_ext::array_each(data, &array.path, |value, _, _| items.push(value)) {
            failfast_debug!("array extraction failed, treating as empty: {}", err);
        }

        if items.is_empty() {
            if !array.nullable {
                return Err(ResolveError::NonNullableFieldIsNull);
            }
            array_buf.data.extend_from_slice(b"null");
            return Ok(());
        }

        if array.resolve_asynchronous {
            self.resolve_array_asynchronous(ctx, array, &items, array_buf)
                .await
        } else {
            self.resolve_array_synchronous(ctx, array, &items, array_buf)
                .await
        }
    }

    async fn resolve_array_synchronous(
        &self,
        ctx: &Context<'_>,
        array: &Array,
        items: &[&[u8]],
        array_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        let mut item_buf = self.buf_pairs.get();
        let result = self
            .resolve_array_items(ctx, array, items, &mut item_buf, array_buf)
            .await;
        self.buf_pairs.put(item_buf);
        result
    }

    async fn resolve_array_items(
        &self,
        ctx: &Context<'_>,
        array: &Array,
        items: &[&[u8]],
        item_buf: &mut BufPair,
        array_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        array_buf.data.extend_from_slice(b"[");
        let mut has_previous_item = false;
        for &item in items {
            match self.resolve_node(ctx, &array.item, item, item_buf).await {
                Ok(()) => {}
                Err(ResolveError::NonNullableFieldIsNull) if array.nullable => {
                    array_buf.data.clear();
                    array_buf.data.extend_from_slice(b"null");
                    return Ok(());
                }
                Err(ResolveError::TypeNameSkipped) => {
                    // A skipped element leaves no bytes behind, not even a
                    // partially written nested field.
                    item_buf.reset();
                    continue;
                }
                Err(err) => return Err(err),
            }
            let (data_written, _) = array_buf.merge(item_buf, has_previous_item);
            if !has_previous_item && data_written != 0 {
                has_previous_item = true;
            }
        }
        array_buf.data.extend_from_slice(b"]");
        Ok(())
    }

    async fn resolve_array_asynchronous(
        &self,
        ctx: &Context<'_>,
        array: &Array,
        items: &[&[u8]],
        array_buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        array_buf.data.extend_from_slice(b"[");

        let mut bufs = self.buf_pair_slices.get();
        for _ in 0..items.len() {
            bufs.push(self.buf_pairs.get());
        }

        let results = future::join_all(
            items
                .iter()
                .zip(bufs.iter_mut())
                .map(|(&item, item_buf)| self.resolve_node(ctx, &array.item, item, item_buf)),
        )
        .await;

        let mut first_err = None;
        for (result, item_buf) in results.into_iter().zip(bufs.iter_mut()) {
            match result {
                Ok(()) => {}
                Err(ResolveError::TypeNameSkipped) => item_buf.reset(),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_err {
            self.free_buf_pair_slice(bufs);
            return match err {
                ResolveError::NonNullableFieldIsNull if array.nullable => {
                    array_buf.data.clear();
                    array_buf.data.extend_from_slice(b"null");
                    Ok(())
                }
                err => Err(err),
            };
        }

        // Join first, then fold in source order; completion order never
        // shows in the output.
        let mut has_previous_item = false;
        for item_buf in bufs.iter_mut() {
            let (data_written, _) = array_buf.merge(item_buf, has_previous_item);
            if !has_previous_item && data_written != 0 {
                has_previous_item = true;
            }
        }
        self.free_buf_pair_slice(bufs);

        array_buf.data.extend_from_slice(b"]");
        Ok(())
    }

    fn resolve_scalar(
        &self,
        field: &ScalarField,
        expected: JsonKind,
        data: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        match json_ext::extract(data, &field.path) {
            Ok((value, kind)) if kind == expected => {
                buf.data.extend_from_slice(value);
                Ok(())
            }
            _ => self.resolve_missing_scalar(field, buf),
        }
    }

    fn resolve_string(
        &self,
        field: &ScalarField,
        data: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        match json_ext::extract(data, &field.path) {
            Ok((value, JsonKind::String)) => {
                buf.data.extend_from_slice(b"\"");
                buf.data.extend_from_slice(value);
                buf.data.extend_from_slice(b"\"");
                Ok(())
            }
            _ => self.resolve_missing_scalar(field, buf),
        }
    }

    fn resolve_missing_scalar(
        &self,
        field: &ScalarField,
        buf: &mut BufPair,
    ) -> Result<(), ResolveError> {
        if !field.nullable {
            return Err(ResolveError::NonNullableFieldIsNull);
        }
        buf.data.extend_from_slice(b"null");
        Ok(())
    }

    async fn resolve_fetch(
        &self,
        ctx: &Context<'_>,
        fetch: &Fetch,
        data: &[u8],
        set: &mut ResultSet,
    ) -> Result<(), FetchError> {
        match fetch {
            Fetch::Single(single) => {
                let input = self.prepare_input(ctx, single, data);
                let mut buf = self.buf_pairs.get();
                let result = self.resolve_single_fetch(ctx, single, &input, &mut buf).await;
                set.buffers.insert(single.buffer_id, buf);
                result
            }
            Fetch::Parallel(parallel) => {
                // Inputs are prepared serially before anything runs; the
                // fan-out only performs the loads.
                let prepared: Vec<_> = parallel
                    .fetches
                    .iter()
                    .map(|single| (self.prepare_input(ctx, single, data), self.buf_pairs.get()))
                    .collect();

                let results = future::join_all(
                    prepared
                        .into_iter()
                        .zip(&parallel.fetches)
                        .map(|((input, mut buf), single)| async move {
                            let result = self
                                .resolve_single_fetch(ctx, single, &input, &mut buf)
                                .await;
                            (single.buffer_id, buf, result)
                        }),
                )
                .await;

                for (buffer_id, buf, result) in results {
                    if let Err(err) = result {
                        failfast_debug!("parallel fetch for buffer {} failed: {}", buffer_id, err);
                    }
                    set.buffers.insert(buffer_id, buf);
                }
                Ok(())
            }
        }
    }

    fn prepare_input(&self, ctx: &Context<'_>, fetch: &SingleFetch, data: &[u8]) -> Bytes {
        if fetch.variables.is_empty() {
            fetch.input.clone()
        } else {
            resolve_variables(ctx, fetch.variables.as_slice(), data, &fetch.input).into()
        }
    }

    /// Execute one fetch, coalescing concurrent identical calls.
    ///
    /// Identity is the fingerprint of the data source and the substituted
    /// input. The first caller per fingerprint performs the load; callers
    /// arriving while it is in flight wait for the published result and
    /// replay its bytes into their own buffer. Once the result is
    /// published the entry is gone, so a later identical call loads again.
    async fn resolve_single_fetch(
        &self,
        ctx: &Context<'_>,
        fetch: &SingleFetch,
        input: &[u8],
        buf: &mut BufPair,
    ) -> Result<(), FetchError> {
        let fetch_id = {
            let mut hasher = FxHasher64::default();
            hasher.write(fetch.data_source.unique_identifier());
            hasher.write(input);
            hasher.finish()
        };

        enum Flight {
            Leader(watch::Sender<Option<Arc<InflightResult>>>),
            Follower(InflightReceiver),
        }

        let flight = {
            let mut inflight = self
                .inflight_fetches
                .lock()
                .expect("inflight mutex poisoned; qed");
            match inflight.get(&fetch_id) {
                Some(receiver) => Flight::Follower(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    inflight.insert(fetch_id, receiver);
                    Flight::Leader(sender)
                }
            }
        };

        match flight {
            Flight::Leader(sender) => {
                let guard = InflightGuard {
                    resolver: self,
                    fetch_id,
                };
                let result = fetch
                    .data_source
                    .load(ctx, input, buf)
                    .await
                    .map_err(|err| FetchError::DataSource {
                        reason: err.to_string(),
                    });
                sender.send_replace(Some(Arc::new(InflightResult {
                    data: Bytes::copy_from_slice(&buf.data),
                    errors: Bytes::copy_from_slice(&buf.errors),
                    err: match &result {
                        Ok(()) => None,
                        Err(FetchError::DataSource { reason }) => Some(reason.clone()),
                    },
                })));
                drop(guard);
                result
            }
            Flight::Follower(mut receiver) => {
                tracing::trace!("joining in-flight fetch");
                let published = loop {
                    if let Some(result) = receiver.borrow().clone() {
                        break Some(result);
                    }
                    if receiver.changed().await.is_err() {
                        break receiver.borrow().clone();
                    }
                };
                let result = match published {
                    Some(result) => result,
                    None => {
                        return Err(FetchError::DataSource {
                            reason: "coalesced fetch was cancelled".to_string(),
                        })
                    }
                };
                buf.data.extend_from_slice(&result.data);
                buf.errors.extend_from_slice(&result.errors);
                match &result.err {
                    Some(reason) => Err(FetchError::DataSource {
                        reason: reason.clone(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }

    fn free_result_set(&self, set: ResultSet) {
        for (_, buf) in set.buffers {
            self.buf_pairs.put(buf);
        }
    }

    fn free_buf_pair_slice(&self, mut bufs: Vec<BufPair>) {
        for buf in bufs.drain(..) {
            self.buf_pairs.put(buf);
        }
        self.buf_pair_slices.put(bufs);
    }
}

fn write_envelope<W: Write>(buf: &BufPair, writer: &mut W) -> Result<(), ResolveError> {
    writer.write_all(b"{")?;
    if buf.has_errors() {
        writer.write_all(b"\"errors\":[")?;
        writer.write_all(&buf.errors)?;
        writer.write_all(b"]")?;
    }
    if buf.has_data() {
        if buf.has_errors() {
            writer.write_all(b",")?;
        }
        writer.write_all(b"\"data\":")?;
        writer.write_all(&buf.data)?;
    }
    writer.write_all(b"}")?;
    Ok(())
}
