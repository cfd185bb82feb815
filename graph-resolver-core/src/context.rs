/// Per-request ambient state threaded through resolution.
///
/// Carries the raw variables JSON consumed by context variables.
/// Cancellation is ambient: dropping the resolve future cancels any
/// data-source work still in flight.
#[derive(Clone, Copy, Debug, Default)]
pub struct Context<'a> {
    pub variables: &'a [u8],
}

impl<'a> Context<'a> {
    pub fn new(variables: &'a [u8]) -> Self {
        Self { variables }
    }
}
