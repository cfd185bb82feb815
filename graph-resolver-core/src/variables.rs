use crate::context::Context;
use crate::json_ext;

/// A value source for fetch-input substitution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Variable {
    /// Reads from the request's variables JSON.
    Context { path: Vec<String> },
    /// Reads from the parent data at resolve time.
    Object { path: Vec<String> },
}

/// Ordered list of the variables referenced by one fetch input.
///
/// Position in the list is identity: variable `i` is addressed by the
/// `$$i$$` marker inside the input template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables {
    variables: Vec<Variable>,
}

impl Variables {
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            variables: variables.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub(crate) fn as_slice(&self) -> &[Variable] {
        &self.variables
    }

    /// Register `variable` and return its marker plus whether an equal
    /// variable was already present.
    ///
    /// Equal variables share a single marker. With `quote_value` the marker
    /// is wrapped in double quotes for use in string positions.
    pub fn add_variable(&mut self, variable: Variable, quote_value: bool) -> (Vec<u8>, bool) {
        let (index, existed) = match self.variables.iter().position(|v| *v == variable) {
            Some(index) => (index, true),
            None => {
                self.variables.push(variable);
                (self.variables.len() - 1, false)
            }
        };
        let mut name = marker(index);
        if quote_value {
            name.insert(0, b'"');
            name.push(b'"');
        }
        (name, existed)
    }
}

fn marker(index: usize) -> Vec<u8> {
    format!("$${index}$$").into_bytes()
}

/// Produce a fresh fetch input from `input`, replacing every occurrence of
/// each variable's marker with the bytes extracted from its source.
///
/// Substitution runs in list order, so a later variable sees bytes written
/// by an earlier one. A variable whose extraction fails is skipped, leaving
/// its marker in place.
pub(crate) fn resolve_variables(
    ctx: &Context<'_>,
    variables: &[Variable],
    data: &[u8],
    input: &[u8],
) -> Vec<u8> {
    let mut input = input.to_vec();
    for (index, variable) in variables.iter().enumerate() {
        let marker = marker(index);
        let (source, path) = match variable {
            Variable::Context { path } => (ctx.variables, path),
            Variable::Object { path } => (data, path),
        };
        let value = match json_ext::extract(source, path) {
            Ok((value, _)) => value,
            Err(_) => continue,
        };
        while let Some(at) = find(&input, &marker) {
            input.splice(at..at + marker.len(), value.iter().copied());
        }
    }
    input
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn add_variable_dedupes_by_value() {
        let mut variables = Variables::default();
        let (first, existed) = variables.add_variable(
            Variable::Context {
                path: vec!["id".to_string()],
            },
            false,
        );
        assert!(!existed);
        assert_eq!(first, b"$$0$$");

        let (again, existed) = variables.add_variable(
            Variable::Context {
                path: vec!["id".to_string()],
            },
            false,
        );
        assert!(existed);
        assert_eq!(again, b"$$0$$");

        let (second, existed) = variables.add_variable(
            Variable::Object {
                path: vec!["id".to_string()],
            },
            true,
        );
        assert!(!existed);
        assert_eq!(second, br#""$$1$$""#);
        assert_eq!(variables.len(), 2);
    }

    #[test]
    fn resolve_variables_substitutes_from_both_sources() {
        let ctx = Context::new(br#"{"id":7}"#);
        let variables = [
            Variable::Context {
                path: vec!["id".to_string()],
            },
            Variable::Object {
                path: vec!["name".to_string()],
            },
        ];
        let out = resolve_variables(
            &ctx,
            &variables,
            br#"{"name":"ada"}"#,
            br#"{"userId":$$0$$,"userName":"$$1$$"}"#,
        );
        assert_eq!(out, br#"{"userId":7,"userName":"ada"}"#);
    }

    #[test]
    fn resolve_variables_replaces_every_occurrence() {
        let ctx = Context::new(br#"{"id":1}"#);
        let variables = [Variable::Context {
            path: vec!["id".to_string()],
        }];
        let out = resolve_variables(&ctx, &variables, b"{}", b"$$0$$ and $$0$$");
        assert_eq!(out, b"1 and 1");
    }

    #[test]
    fn resolve_variables_skips_missing_values() {
        let ctx = Context::new(br#"{"present":1}"#);
        let variables = [
            Variable::Context {
                path: vec!["absent".to_string()],
            },
            Variable::Context {
                path: vec!["present".to_string()],
            },
        ];
        let out = resolve_variables(&ctx, &variables, b"{}", b"[$$0$$,$$1$$]");
        assert_eq!(out, b"[$$0$$,1]");
    }

    #[test]
    fn resolve_variables_is_a_fixpoint_once_markers_are_consumed() {
        let ctx = Context::new(br#"{"id":7}"#);
        let variables = [Variable::Context {
            path: vec!["id".to_string()],
        }];
        let once = resolve_variables(&ctx, &variables, b"{}", b"{\"id\":$$0$$}");
        let twice = resolve_variables(&ctx, &variables, b"{}", &once);
        assert_eq!(once, twice);
    }
}
