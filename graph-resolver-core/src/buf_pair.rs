use bytes::BytesMut;

/// Paired growable buffers for the `data` and `errors` streams of one
/// resolve call.
///
/// A pair is exclusively held by a single resolve call at a time and flows
/// back into the resolver's pool once that call completes.
#[derive(Debug, Default)]
pub struct BufPair {
    pub data: BytesMut,
    pub errors: BytesMut,
}

impl BufPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            errors: BytesMut::with_capacity(capacity),
        }
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Clear both buffers, keeping their capacity.
    pub fn reset(&mut self) {
        self.data.clear();
        self.errors.clear();
    }

    /// Append one GraphQL error object to the errors stream, comma-joined
    /// with any error already present.
    ///
    /// `locations` and `path` must already be valid JSON fragments; they are
    /// written verbatim and omitted when `None`. `message` is quoted but not
    /// escaped, so it must not contain raw `"` or control characters.
    pub fn write_err(&mut self, message: &[u8], locations: Option<&[u8]>, path: Option<&[u8]>) {
        if self.has_errors() {
            self.errors.extend_from_slice(b",");
        }
        self.errors.extend_from_slice(b"{\"message\":\"");
        self.errors.extend_from_slice(message);
        self.errors.extend_from_slice(b"\"");
        if let Some(locations) = locations {
            self.errors.extend_from_slice(b",\"locations\":");
            self.errors.extend_from_slice(locations);
        }
        if let Some(path) = path {
            self.errors.extend_from_slice(b",\"path\":");
            self.errors.extend_from_slice(path);
        }
        self.errors.extend_from_slice(b"}");
    }

    /// Drain both streams of `from` into `self`, returning the number of
    /// data and error bytes written.
    ///
    /// The comma discipline lives here and in the object writer only: data
    /// is prefixed with a comma iff `prefix_data_with_comma`, errors iff
    /// `self` already holds errors.
    pub fn merge(&mut self, from: &mut BufPair, prefix_data_with_comma: bool) -> (usize, usize) {
        let data_written = self.merge_data(from, prefix_data_with_comma);
        let errors_written = self.merge_errors(from);
        (data_written, errors_written)
    }

    pub fn merge_data(&mut self, from: &mut BufPair, prefix_with_comma: bool) -> usize {
        if !from.has_data() {
            return 0;
        }
        let mut written = 0;
        if prefix_with_comma {
            self.data.extend_from_slice(b",");
            written += 1;
        }
        written += from.data.len();
        self.data.extend_from_slice(&from.data);
        from.data.clear();
        written
    }

    pub fn merge_errors(&mut self, from: &mut BufPair) -> usize {
        if !from.has_errors() {
            return 0;
        }
        let mut written = 0;
        if self.has_errors() {
            self.errors.extend_from_slice(b",");
            written += 1;
        }
        written += from.errors.len();
        self.errors.extend_from_slice(&from.errors);
        from.errors.clear();
        written
    }
}
