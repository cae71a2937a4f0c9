//! Extension negotiation for the `Sec-WebSocket-Extensions` header
//! (RFC 6455 Section 9, RFC 7692).
//!
//! [`parse`] and [`format`] implement the header mini-language:
//!
//! ```text
//! offer-list = offer *( "," offer )
//! offer      = token *( ";" param )
//! param      = token [ "=" (token | quoted-string) ]
//! ```
//!
//! Tokens use the RFC 7230 token character class; optional whitespace is
//! permitted around delimiters. The structures preserve header order and
//! accumulate repeated names, so one header may offer the same extension
//! twice with different parameter sets.
//!
//! The module also defines the [`Compressor`] contract through which the
//! sender consumes a negotiated compression extension; the compressor
//! implementation itself lives outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::validation::is_token_char;

/// Extension name the sender consults for per-message compression.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// Value of one extension parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Parameter present with no `=value` part, e.g. `server_no_context_takeover`.
    Flag,
    /// Parameter with an explicit value, e.g. `server_max_window_bits=12`.
    Value(String),
}

/// Ordered parameter mapping for one extension offer.
///
/// Repeated parameter names within an offer accumulate into a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferParams {
    entries: Vec<(String, Vec<ParamValue>)>,
}

impl OfferParams {
    /// Create an empty parameter mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`, accumulating with earlier values of the
    /// same parameter.
    pub fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        if let Some((_, values)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            values.push(value);
        } else {
            self.entries.push((name, vec![value]));
        }
    }

    /// All values recorded for `name`, in header order.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[ParamValue]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Whether `name` is present as a bare flag.
    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|values| values.contains(&ParamValue::Flag))
    }

    /// Whether the offer carries no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate parameters in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

/// Ordered mapping of extension name to its offered parameter sets.
///
/// Repeated offers of the same extension accumulate as a list, one entry per
/// occurrence in the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionOffers {
    entries: Vec<(String, Vec<OfferParams>)>,
}

impl ExtensionOffers {
    /// Create an empty offer list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one offer of `name`, accumulating with earlier offers of the
    /// same extension.
    pub fn push(&mut self, name: impl Into<String>, params: OfferParams) {
        let name = name.into();
        if let Some((_, offers)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            offers.push(params);
        } else {
            self.entries.push((name, vec![params]));
        }
    }

    /// All parameter sets offered for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[OfferParams]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offers)| offers.as_slice())
    }

    /// Number of distinct extension names offered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no extension was offered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate extensions in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OfferParams])> {
        self.entries
            .iter()
            .map(|(name, offers)| (name.as_str(), offers.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Start of header or after `,`.
    BeforeName,
    /// Accumulating an extension name token.
    InName,
    /// Whitespace seen after a name; a delimiter must follow.
    AfterName,
    /// After `;`.
    BeforeParam,
    /// Accumulating a parameter name token.
    InParam,
    /// Whitespace seen after a parameter name.
    AfterParam,
    /// After `=`.
    BeforeValue,
    /// Accumulating an unquoted value token.
    InValue,
    /// Inside a quoted string.
    InQuoted,
    /// Value complete; a delimiter must follow.
    AfterValue,
}

/// Parse a `Sec-WebSocket-Extensions` header value.
///
/// Malformed input aborts with [`Error::HeaderSyntax`] carrying the
/// offending index and character, or [`Error::TruncatedHeader`] when the
/// header ends mid-construct; no partial result is produced. A name or
/// parameter left open at end-of-input with no trailing delimiter is
/// committed as written.
pub fn parse(header: &str) -> Result<ExtensionOffers> {
    let mut offers = ExtensionOffers::new();
    let mut params = OfferParams::new();
    let mut name = String::new();
    let mut param_name = String::new();
    let mut value = String::new();
    let mut escaping = false;
    let mut state = ParseState::BeforeName;

    let is_ws = |c: char| c == ' ' || c == '\t';
    let token = |c: char| c.is_ascii() && is_token_char(c as u8);

    for (index, ch) in header.char_indices() {
        let err = Error::HeaderSyntax { index, found: ch };

        match state {
            ParseState::BeforeName => {
                if token(ch) {
                    name.push(ch);
                    state = ParseState::InName;
                } else if !is_ws(ch) {
                    return Err(err);
                }
            }
            ParseState::InName | ParseState::AfterName => match ch {
                c if state == ParseState::InName && token(c) => name.push(c),
                ';' => state = ParseState::BeforeParam,
                ',' => {
                    offers.push(std::mem::take(&mut name), std::mem::take(&mut params));
                    state = ParseState::BeforeName;
                }
                c if is_ws(c) => state = ParseState::AfterName,
                _ => return Err(err),
            },
            ParseState::BeforeParam => {
                if token(ch) {
                    param_name.push(ch);
                    state = ParseState::InParam;
                } else if !is_ws(ch) {
                    return Err(err);
                }
            }
            ParseState::InParam | ParseState::AfterParam => match ch {
                c if state == ParseState::InParam && token(c) => param_name.push(c),
                '=' => state = ParseState::BeforeValue,
                ';' => {
                    params.push(std::mem::take(&mut param_name), ParamValue::Flag);
                    state = ParseState::BeforeParam;
                }
                ',' => {
                    params.push(std::mem::take(&mut param_name), ParamValue::Flag);
                    offers.push(std::mem::take(&mut name), std::mem::take(&mut params));
                    state = ParseState::BeforeName;
                }
                c if is_ws(c) => state = ParseState::AfterParam,
                _ => return Err(err),
            },
            ParseState::BeforeValue => {
                if token(ch) {
                    value.push(ch);
                    state = ParseState::InValue;
                } else if ch == '"' {
                    state = ParseState::InQuoted;
                } else if !is_ws(ch) {
                    // A backslash escape outside quotes is rejected here too.
                    return Err(err);
                }
            }
            ParseState::InValue | ParseState::AfterValue => match ch {
                c if state == ParseState::InValue && token(c) => value.push(c),
                ';' => {
                    params.push(
                        std::mem::take(&mut param_name),
                        ParamValue::Value(std::mem::take(&mut value)),
                    );
                    state = ParseState::BeforeParam;
                }
                ',' => {
                    params.push(
                        std::mem::take(&mut param_name),
                        ParamValue::Value(std::mem::take(&mut value)),
                    );
                    offers.push(std::mem::take(&mut name), std::mem::take(&mut params));
                    state = ParseState::BeforeName;
                }
                c if is_ws(c) => state = ParseState::AfterValue,
                _ => return Err(err),
            },
            ParseState::InQuoted => {
                if escaping {
                    // Only token characters may be escaped; quoting exists
                    // so a value token can carry surrounding syntax, not to
                    // smuggle arbitrary text into a value.
                    if !token(ch) {
                        return Err(err);
                    }
                    value.push(ch);
                    escaping = false;
                } else if ch == '\\' {
                    escaping = true;
                } else if ch == '"' {
                    if value.is_empty() {
                        return Err(err);
                    }
                    state = ParseState::AfterValue;
                } else if token(ch) {
                    value.push(ch);
                } else {
                    return Err(err);
                }
            }
        }
    }

    match state {
        ParseState::BeforeName => {
            // Empty or whitespace-only input parses to no offers, but a
            // trailing comma leaves a dangling offer slot.
            if offers.is_empty() && header.trim().is_empty() {
                Ok(offers)
            } else {
                Err(Error::TruncatedHeader)
            }
        }
        ParseState::InName | ParseState::AfterName => {
            offers.push(name, params);
            Ok(offers)
        }
        ParseState::InParam | ParseState::AfterParam => {
            params.push(param_name, ParamValue::Flag);
            offers.push(name, params);
            Ok(offers)
        }
        ParseState::InValue | ParseState::AfterValue => {
            params.push(param_name, ParamValue::Value(value));
            offers.push(name, params);
            Ok(offers)
        }
        ParseState::BeforeParam | ParseState::BeforeValue | ParseState::InQuoted => {
            Err(Error::TruncatedHeader)
        }
    }
}

/// Format extension offers back into header text.
///
/// Each parameter set of an extension becomes one comma-separated offer;
/// each value of a multi-valued parameter becomes its own `name` or
/// `name=value` token. Output need not reproduce a parsed header verbatim,
/// but re-parsing it yields an equal [`ExtensionOffers`].
#[must_use]
pub fn format(offers: &ExtensionOffers) -> String {
    let mut rendered = Vec::new();

    for (name, configurations) in offers.iter() {
        for params in configurations {
            let mut parts = vec![name.to_string()];
            for (param_name, values) in params.iter() {
                for value in values {
                    parts.push(match value {
                        ParamValue::Flag => param_name.to_string(),
                        ParamValue::Value(v) => std::format!("{}={}", param_name, v),
                    });
                }
            }
            rendered.push(parts.join("; "));
        }
    }

    rendered.join(", ")
}

/// Completion callback for a compression request. Invoked exactly once.
pub type CompressDone = Box<dyn FnOnce(Result<Vec<u8>>) + Send>;

/// Narrow contract through which the sender consumes a negotiated
/// compression extension.
///
/// The sender never looks inside the compressor: it hands over a message
/// fragment and receives the compressed bytes through the callback, possibly
/// on another thread. Implementations manage their own deflate context.
pub trait Compressor: Send + Sync {
    /// Compress one fragment. `fin` marks the final fragment of a message so
    /// the implementation can flush and, without context takeover, reset its
    /// context. `done` must be invoked exactly once.
    fn compress(&self, data: Vec<u8>, fin: bool, done: CompressDone);

    /// Whether context takeover is disabled for this side's role.
    fn no_context_takeover(&self) -> bool;

    /// Minimum payload size worth compressing when context takeover is
    /// disabled; below it the per-message context reset costs more than the
    /// compression saves.
    fn threshold(&self) -> usize;
}

/// Connection-scoped mapping of negotiated extension name to its
/// compressor, handed to the sender at construction.
#[derive(Default, Clone)]
pub struct Extensions {
    map: HashMap<String, Arc<dyn Compressor>>,
}

impl Extensions {
    /// Create an empty mapping (no extension negotiated).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a negotiated extension under its header name.
    pub fn insert(&mut self, name: impl Into<String>, compressor: Arc<dyn Compressor>) {
        self.map.insert(name.into(), compressor);
    }

    /// Look up a negotiated extension by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Compressor>> {
        self.map.get(name).cloned()
    }

    /// Whether any extension was negotiated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("names", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(name: &str) -> (String, Vec<ParamValue>) {
        (name.to_string(), vec![ParamValue::Flag])
    }

    #[test]
    fn test_parse_single_offer_with_flag() {
        let offers = parse("permessage-deflate; client_max_window_bits").unwrap();
        assert_eq!(offers.len(), 1);
        let configs = offers.get("permessage-deflate").unwrap();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].has_flag("client_max_window_bits"));
    }

    #[test]
    fn test_parse_bare_name() {
        let offers = parse("permessage-deflate").unwrap();
        let configs = offers.get("permessage-deflate").unwrap();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].is_empty());
    }

    #[test]
    fn test_parse_valued_params() {
        let offers =
            parse("permessage-deflate; server_max_window_bits=10; client_max_window_bits=12")
                .unwrap();
        let config = &offers.get("permessage-deflate").unwrap()[0];
        assert_eq!(
            config.get("server_max_window_bits").unwrap(),
            &[ParamValue::Value("10".into())]
        );
        assert_eq!(
            config.get("client_max_window_bits").unwrap(),
            &[ParamValue::Value("12".into())]
        );
    }

    #[test]
    fn test_parse_repeated_offers_accumulate() {
        // "foo; bar=baz, foo" -> { foo: [{bar: "baz"}, {}] }
        let offers = parse("foo; bar=baz, foo").unwrap();
        let configs = offers.get("foo").unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(
            configs[0].get("bar").unwrap(),
            &[ParamValue::Value("baz".into())]
        );
        assert!(configs[1].is_empty());
    }

    #[test]
    fn test_parse_repeated_params_accumulate() {
        let offers = parse("foo; bar; bar=2").unwrap();
        let config = &offers.get("foo").unwrap()[0];
        assert_eq!(
            config.get("bar").unwrap(),
            &[ParamValue::Flag, ParamValue::Value("2".into())]
        );
    }

    #[test]
    fn test_parse_multiple_extensions_in_order() {
        let offers = parse("foo, bar; baz=1, quux").unwrap();
        let names: Vec<&str> = offers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["foo", "bar", "quux"]);
    }

    #[test]
    fn test_parse_quoted_value() {
        let offers = parse(r#"foo; server_max_window_bits="10""#).unwrap();
        let config = &offers.get("foo").unwrap()[0];
        assert_eq!(
            config.get("server_max_window_bits").unwrap(),
            &[ParamValue::Value("10".into())]
        );
    }

    #[test]
    fn test_parse_quoted_escape() {
        let offers = parse(r#"foo; bar="a\bc""#).unwrap();
        let config = &offers.get("foo").unwrap()[0];
        assert_eq!(
            config.get("bar").unwrap(),
            &[ParamValue::Value("abc".into())]
        );
    }

    #[test]
    fn test_parse_quoted_non_token_rejected() {
        let err = parse(r#"foo; bar="with space""#).unwrap_err();
        assert!(matches!(err, Error::HeaderSyntax { found: ' ', .. }));

        let err = parse(r#"foo; bar="a\"b""#).unwrap_err();
        assert!(matches!(err, Error::HeaderSyntax { found: '"', .. }));
    }

    #[test]
    fn test_parse_empty_quoted_value_rejected() {
        let err = parse(r#"foo; bar="""#).unwrap_err();
        assert!(matches!(err, Error::HeaderSyntax { found: '"', .. }));
    }

    #[test]
    fn test_parse_escape_outside_quotes_rejected() {
        let err = parse(r"foo; bar=a\b").unwrap_err();
        assert!(matches!(err, Error::HeaderSyntax { found: '\\', .. }));
    }

    #[test]
    fn test_parse_empty_param_segment_rejected() {
        let err = parse("foo;;bar").unwrap_err();
        assert_eq!(
            err,
            Error::HeaderSyntax {
                index: 4,
                found: ';'
            }
        );
    }

    #[test]
    fn test_parse_syntax_error_reports_index() {
        let err = parse("foo; b@r").unwrap_err();
        assert_eq!(
            err,
            Error::HeaderSyntax {
                index: 6,
                found: '@'
            }
        );
    }

    #[test]
    fn test_parse_trailing_name_committed() {
        // No trailing delimiter: the open name still commits.
        let offers = parse("foo, bar").unwrap();
        assert!(offers.get("bar").is_some());

        // A pending parameter at end-of-input commits as a flag.
        let offers = parse("foo; bar").unwrap();
        assert!(offers.get("foo").unwrap()[0].has_flag("bar"));

        // A pending value commits too.
        let offers = parse("foo; bar=baz").unwrap();
        assert_eq!(
            offers.get("foo").unwrap()[0].get("bar").unwrap(),
            &[ParamValue::Value("baz".into())]
        );
    }

    #[test]
    fn test_parse_truncated_inputs() {
        assert_eq!(parse("foo;").unwrap_err(), Error::TruncatedHeader);
        assert_eq!(parse("foo; bar=").unwrap_err(), Error::TruncatedHeader);
        assert_eq!(parse(r#"foo; bar="open"#).unwrap_err(), Error::TruncatedHeader);
        assert_eq!(parse("foo,").unwrap_err(), Error::TruncatedHeader);
    }

    #[test]
    fn test_parse_empty_header() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_leading_delimiter_rejected() {
        assert!(matches!(
            parse(", foo").unwrap_err(),
            Error::HeaderSyntax { index: 0, .. }
        ));
        assert!(matches!(
            parse("; foo").unwrap_err(),
            Error::HeaderSyntax { index: 0, .. }
        ));
    }

    #[test]
    fn test_parse_space_inside_token_rejected() {
        let err = parse("foo bar").unwrap_err();
        assert_eq!(
            err,
            Error::HeaderSyntax {
                index: 4,
                found: 'b'
            }
        );
    }

    #[test]
    fn test_format_single_offer() {
        let mut params = OfferParams::new();
        params.push("client_max_window_bits", ParamValue::Flag);
        let mut offers = ExtensionOffers::new();
        offers.push("permessage-deflate", params);

        assert_eq!(format(&offers), "permessage-deflate; client_max_window_bits");
    }

    #[test]
    fn test_format_bare_name() {
        let mut offers = ExtensionOffers::new();
        offers.push("foo", OfferParams::new());
        assert_eq!(format(&offers), "foo");
    }

    #[test]
    fn test_format_multiple_configurations() {
        let mut first = OfferParams::new();
        first.push("bar", ParamValue::Value("baz".into()));
        let mut offers = ExtensionOffers::new();
        offers.push("foo", first);
        offers.push("foo", OfferParams::new());

        assert_eq!(format(&offers), "foo; bar=baz, foo");
    }

    #[test]
    fn test_format_multi_valued_param() {
        let mut params = OfferParams::new();
        params.push("bits", ParamValue::Value("8".into()));
        params.push("bits", ParamValue::Value("15".into()));
        let mut offers = ExtensionOffers::new();
        offers.push("foo", params);

        assert_eq!(format(&offers), "foo; bits=8; bits=15");
    }

    #[test]
    fn test_parse_format_parse_idempotent() {
        for header in [
            "permessage-deflate; client_max_window_bits",
            "permessage-deflate; server_no_context_takeover; server_max_window_bits=10",
            "foo; bar=baz, foo",
            "foo, bar; baz, quux; a=1; b; a=2",
        ] {
            let first = parse(header).unwrap();
            let second = parse(&format(&first)).unwrap();
            assert_eq!(first, second, "header {:?}", header);
        }
    }

    #[test]
    fn test_offer_params_accessors() {
        let offers = parse("foo; a=1; b").unwrap();
        let config = &offers.get("foo").unwrap()[0];
        let entries: Vec<(String, Vec<ParamValue>)> = config
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_vec()))
            .collect();
        assert_eq!(entries[0].0, "a");
        assert_eq!(entries[1], flag("b"));
        assert!(config.get("missing").is_none());
        assert!(!config.has_flag("a"));
    }
}
