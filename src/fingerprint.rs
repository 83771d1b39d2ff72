use crate::error::Ja4CorrelateError;
use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::combinator::all_consuming;
use nom::multi::separated_list1;
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;

/// Separator between the segments of every JA4+ fingerprint.
pub const SEGMENT_DELIMITER: char = '_';

/// Separator between the component fingerprints of a combined key, e.g. `ja4|ja4s`.
pub const COMPONENT_DELIMITER: char = '|';

/// Pattern segment that accepts any observed value at its position.
pub const WILDCARD: &str = "*";

/// JA4+ fingerprint family member.
///
/// Every kind has a fixed number of `_`-separated segments. The combined kinds key one
/// connection by several fingerprints at once, joined with `|`. Kind names are decoded
/// case-insensitively, and aliases such as `client-hello` or `http` are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum FingerprintKind {
    /// TLS/QUIC client: `a_b_c`
    #[default]
    Ja4,
    /// TLS/QUIC server: `a_b_c`
    Ja4S,
    /// HTTP client: `a_b_c_d`
    Ja4H,
    /// X.509 certificate: `a_b_c`
    Ja4X,
    /// TCP client: `window_options_mss_wscale`
    Ja4T,
    /// TCP server: `window_options_mss_wscale`
    Ja4TS,
    /// SSH traffic: `c_s_ack`
    Ja4Ssh,
    /// Client and server hello of one connection: `ja4|ja4s`
    Ja4Ja4S,
    /// Client hello, server hello and TCP server options: `ja4|ja4s|ja4ts`
    Ja4Ja4STs,
}

impl FingerprintKind {
    pub const ALL: [FingerprintKind; 9] = [
        FingerprintKind::Ja4,
        FingerprintKind::Ja4S,
        FingerprintKind::Ja4H,
        FingerprintKind::Ja4X,
        FingerprintKind::Ja4T,
        FingerprintKind::Ja4TS,
        FingerprintKind::Ja4Ssh,
        FingerprintKind::Ja4Ja4S,
        FingerprintKind::Ja4Ja4STs,
    ];

    /// Number of segments a well-formed fingerprint of this kind carries, over all of
    /// its components.
    pub fn segment_count(self) -> usize {
        match self {
            FingerprintKind::Ja4
            | FingerprintKind::Ja4S
            | FingerprintKind::Ja4X
            | FingerprintKind::Ja4Ssh => 3,
            FingerprintKind::Ja4H | FingerprintKind::Ja4T | FingerprintKind::Ja4TS => 4,
            FingerprintKind::Ja4Ja4S => 6,
            FingerprintKind::Ja4Ja4STs => 10,
        }
    }

    /// The single kinds a fingerprint of this kind is made of, in key order.
    pub fn components(self) -> &'static [FingerprintKind] {
        match self {
            FingerprintKind::Ja4 => &[FingerprintKind::Ja4],
            FingerprintKind::Ja4S => &[FingerprintKind::Ja4S],
            FingerprintKind::Ja4H => &[FingerprintKind::Ja4H],
            FingerprintKind::Ja4X => &[FingerprintKind::Ja4X],
            FingerprintKind::Ja4T => &[FingerprintKind::Ja4T],
            FingerprintKind::Ja4TS => &[FingerprintKind::Ja4TS],
            FingerprintKind::Ja4Ssh => &[FingerprintKind::Ja4Ssh],
            FingerprintKind::Ja4Ja4S => &[FingerprintKind::Ja4, FingerprintKind::Ja4S],
            FingerprintKind::Ja4Ja4STs => {
                &[FingerprintKind::Ja4, FingerprintKind::Ja4S, FingerprintKind::Ja4TS]
            }
        }
    }

    pub fn is_combined(self) -> bool {
        self.components().len() > 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FingerprintKind::Ja4 => "ja4",
            FingerprintKind::Ja4S => "ja4s",
            FingerprintKind::Ja4H => "ja4h",
            FingerprintKind::Ja4X => "ja4x",
            FingerprintKind::Ja4T => "ja4t",
            FingerprintKind::Ja4TS => "ja4ts",
            FingerprintKind::Ja4Ssh => "ja4ssh",
            FingerprintKind::Ja4Ja4S => "ja4+ja4s",
            FingerprintKind::Ja4Ja4STs => "ja4+ja4s+ja4ts",
        }
    }
}

impl Serialize for FingerprintKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl TryFrom<String> for FingerprintKind {
    type Error = Ja4CorrelateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for FingerprintKind {
    type Err = Ja4CorrelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja4" | "client-hello" | "client_hello" => Ok(FingerprintKind::Ja4),
            "ja4s" | "server-hello" | "server_hello" => Ok(FingerprintKind::Ja4S),
            "ja4h" | "http" => Ok(FingerprintKind::Ja4H),
            "ja4x" | "x509" => Ok(FingerprintKind::Ja4X),
            "ja4t" | "tcp" => Ok(FingerprintKind::Ja4T),
            "ja4ts" | "tcp-server" | "tcp_server" => Ok(FingerprintKind::Ja4TS),
            "ja4ssh" | "ssh" => Ok(FingerprintKind::Ja4Ssh),
            "ja4+ja4s" | "ja4|ja4s" | "ja4_ja4s" | "ja4-ja4s" => Ok(FingerprintKind::Ja4Ja4S),
            "ja4+ja4s+ja4ts" | "ja4|ja4s|ja4ts" | "ja4_ja4s_ja4ts" | "ja4-ja4s-ja4ts" => {
                Ok(FingerprintKind::Ja4Ja4STs)
            }
            other => Err(Ja4CorrelateError::InvalidFingerprint(format!(
                "unknown fingerprint kind `{other}`"
            ))),
        }
    }
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ',' | '.' | '*')
}

fn parse_segments(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(char(SEGMENT_DELIMITER), take_while1(is_segment_char)))
        .parse(input)
}

/// Splits `raw` into segments and checks the segment count expected for `kind`.
fn split_segments(kind: FingerprintKind, raw: &str) -> Result<Vec<&str>, Ja4CorrelateError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Ja4CorrelateError::InvalidFingerprint(format!(
            "empty {} fingerprint",
            kind.as_str()
        )));
    }

    let (_, segments) = parse_segments(trimmed).map_err(|_| {
        Ja4CorrelateError::InvalidFingerprint(format!(
            "`{trimmed}` has an empty segment or an unexpected character"
        ))
    })?;

    if segments.len() != kind.segment_count() {
        return Err(Ja4CorrelateError::InvalidFingerprint(format!(
            "`{trimmed}` has {} segments, {} expects {}",
            segments.len(),
            kind.as_str(),
            kind.segment_count()
        )));
    }

    Ok(segments)
}

/// Splits `raw` into one segment list per component of `kind`. An empty component of a
/// combined key is `None`; at least one component must be present.
fn split_components(
    kind: FingerprintKind,
    raw: &str,
) -> Result<Vec<Option<Vec<&str>>>, Ja4CorrelateError> {
    if !kind.is_combined() {
        return Ok(vec![Some(split_segments(kind, raw)?)]);
    }

    let trimmed = raw.trim();
    let parts: Vec<&str> = trimmed.split(COMPONENT_DELIMITER).collect();
    if parts.len() != kind.components().len() {
        return Err(Ja4CorrelateError::InvalidFingerprint(format!(
            "`{trimmed}` has {} components, {} expects {}",
            parts.len(),
            kind.as_str(),
            kind.components().len()
        )));
    }

    let components = kind
        .components()
        .iter()
        .zip(parts)
        .map(|(component, part)| {
            if part.is_empty() {
                Ok(None)
            } else {
                split_segments(*component, part).map(Some)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if components.iter().all(Option::is_none) {
        return Err(Ja4CorrelateError::InvalidFingerprint(format!(
            "{} key has no component",
            kind.as_str()
        )));
    }
    Ok(components)
}

/// An observed fingerprint, validated against the segment layout of its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    kind: FingerprintKind,
    segments: Vec<String>,
}

impl Fingerprint {
    /// Parses an observed fingerprint. The wildcard token is not a valid observation.
    ///
    /// A component missing from a combined key is kept as empty segments, which only
    /// wildcard pattern segments accept.
    pub fn parse(kind: FingerprintKind, raw: &str) -> Result<Self, Ja4CorrelateError> {
        let mut segments = Vec::with_capacity(kind.segment_count());
        for (component, parsed) in kind.components().iter().zip(split_components(kind, raw)?) {
            match parsed {
                Some(values) => {
                    if let Some(bad) = values.iter().find(|segment| segment.contains('*')) {
                        return Err(Ja4CorrelateError::InvalidFingerprint(format!(
                            "observed fingerprint segment `{bad}` contains the wildcard token"
                        )));
                    }
                    segments.extend(values.into_iter().map(str::to_string));
                }
                None => segments.extend((0..component.segment_count()).map(|_| String::new())),
            }
        }

        Ok(Self { kind, segments })
    }

    pub fn kind(&self) -> FingerprintKind {
        self.kind
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// One position of a database pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Wildcard,
    Literal(String),
}

impl Segment {
    pub fn accepts(&self, observed: &str) -> bool {
        match self {
            Segment::Wildcard => true,
            Segment::Literal(value) => value == observed,
        }
    }
}

/// A reference fingerprint pattern from the JA4+ database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    kind: FingerprintKind,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parses a pattern. A segment may be the wildcard token `*` as a whole; a `*`
    /// embedded in a longer segment is rejected. An empty component of a combined key
    /// is all wildcards.
    pub fn parse(kind: FingerprintKind, raw: &str) -> Result<Self, Ja4CorrelateError> {
        let mut segments = Vec::with_capacity(kind.segment_count());
        for (component, parsed) in kind.components().iter().zip(split_components(kind, raw)?) {
            let Some(values) = parsed else {
                segments.extend((0..component.segment_count()).map(|_| Segment::Wildcard));
                continue;
            };
            for segment in values {
                if segment == WILDCARD {
                    segments.push(Segment::Wildcard);
                } else if segment.contains('*') {
                    return Err(Ja4CorrelateError::InvalidFingerprint(format!(
                        "pattern segment `{segment}` mixes the wildcard token with literal characters"
                    )));
                } else {
                    segments.push(Segment::Literal(segment.to_string()));
                }
            }
        }

        Ok(Self { kind, segments })
    }

    pub fn kind(&self) -> FingerprintKind {
        self.kind
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of non-wildcard segments.
    pub fn specificity(&self) -> usize {
        self.segments.iter().filter(|segment| matches!(segment, Segment::Literal(_))).count()
    }

    /// True when every segment is a literal.
    pub fn is_exact(&self) -> bool {
        self.specificity() == self.segments.len()
    }

    /// Segment-wise matching rule: every literal equals the observed value at its position.
    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        self.kind == fingerprint.kind
            && self.segments.len() == fingerprint.segments.len()
            && self
                .segments
                .iter()
                .zip(fingerprint.segments.iter())
                .all(|(pattern, observed)| pattern.accepts(observed))
    }
}

/// Free-standing form of [`Pattern::matches`].
pub fn matches(fingerprint: &Fingerprint, pattern: &Pattern) -> bool {
    pattern.matches(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ja4_client_fingerprint() {
        let fp = Fingerprint::parse(FingerprintKind::Ja4, "t13d1516h2_8daaf6152771_e5627efa2ab1")
            .unwrap();
        assert_eq!(fp.segments(), ["t13d1516h2", "8daaf6152771", "e5627efa2ab1"]);
        assert_eq!(fp.to_string(), "t13d1516h2_8daaf6152771_e5627efa2ab1");
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let fp = Fingerprint::parse(FingerprintKind::Ja4T, " 1024_2-4-8-1-3_1460_4\n").unwrap();
        assert_eq!(fp.segments().len(), 4);
    }

    #[test]
    fn test_rejects_empty_segment() {
        assert!(Fingerprint::parse(FingerprintKind::Ja4, "t13d1516h2__e5627efa2ab1").is_err());
        assert!(Fingerprint::parse(FingerprintKind::Ja4, "t13d1516h2_8daaf6152771_").is_err());
    }

    #[test]
    fn test_wildcard_only_as_whole_pattern_segment() {
        let pattern = Pattern::parse(FingerprintKind::Ja4, "t13d1516h2_*_*").unwrap();
        assert_eq!(pattern.specificity(), 1);
        assert!(Pattern::parse(FingerprintKind::Ja4, "t13d*_8daaf6152771_*").is_err());
        assert!(Fingerprint::parse(FingerprintKind::Ja4, "t13d1516h2_*_*").is_err());
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("client-hello".parse::<FingerprintKind>().unwrap(), FingerprintKind::Ja4);
        assert_eq!("HTTP".parse::<FingerprintKind>().unwrap(), FingerprintKind::Ja4H);
        assert_eq!("ja4_ja4s".parse::<FingerprintKind>().unwrap(), FingerprintKind::Ja4Ja4S);
        assert!("ja5".parse::<FingerprintKind>().is_err());
    }

    #[test]
    fn test_combined_key_segments() {
        let fp = Fingerprint::parse(
            FingerprintKind::Ja4Ja4STs,
            "t13d1516h2_8daaf6152771_e5627efa2ab1||14600_2-4-8-1-3_1460_3",
        )
        .unwrap();
        assert_eq!(fp.segments().len(), 10);
        assert!(fp.segments()[3..6].iter().all(String::is_empty));

        let pattern = Pattern::parse(FingerprintKind::Ja4Ja4S, "t13d1516h2_8daaf6152771_*|").unwrap();
        assert_eq!(pattern.specificity(), 2);
        assert!(pattern.matches(&fp_pair("t13d1516h2_8daaf6152771_e5627efa2ab1|")));
        assert!(pattern.matches(&fp_pair("t13d1516h2_8daaf6152771_e5627efa2ab1|t130200_1301_a56c5b993250")));
    }

    fn fp_pair(raw: &str) -> Fingerprint {
        Fingerprint::parse(FingerprintKind::Ja4Ja4S, raw).unwrap()
    }
}
