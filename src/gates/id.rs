//! Parsing of plonky2 gate identifiers. Ids are the gate's `Debug` output with a few
//! gate-specific suffixes, for instance
//! `ExponentiationGate { num_power_bits: 66, _phantom: PhantomData<..> }<D=2>` or
//! `BaseSumGate { num_limbs: 63 } + Base: 2`.

use std::str::FromStr;

use crate::error::{Result, VerifierError};

pub(crate) const GOLDILOCKS_PHANTOM: &str = "PhantomData<plonky2_field::goldilocks_field::GoldilocksField>";

/// A gate id split into its name, `{ .. }` or `( .. )` body and trailing suffix.
#[derive(Debug)]
pub(crate) struct GateId<'a> {
    pub id: &'a str,
    pub name: &'a str,
    body: Option<&'a str>,
    pub suffix: &'a str,
}

impl<'a> GateId<'a> {
    pub fn split(id: &'a str) -> Self {
        let id = id.trim();
        let name_end = id
            .find(|c: char| c == ' ' || c == '(' || c == '<' || c == '{')
            .unwrap_or(id.len());
        let name = &id[..name_end];
        let rest = &id[name_end..];
        let trimmed = rest.trim_start();

        let (body, suffix) = match trimmed.chars().next() {
            Some(open @ ('{' | '(')) => {
                let close = if open == '{' { '}' } else { ')' };
                match matching_close(trimmed, open, close) {
                    Some(end) => (Some(trimmed[1..end].trim()), &trimmed[end + 1..]),
                    None => (None, rest),
                }
            }
            _ => (None, rest),
        };
        Self {
            id,
            name,
            body,
            suffix,
        }
    }

    pub fn malformed(&self, reason: impl Into<String>) -> VerifierError {
        VerifierError::MalformedGate {
            id: self.id.to_string(),
            reason: reason.into(),
        }
    }

    /// `key: value` pairs of a struct-style body, split on top-level commas.
    pub fn fields(&self) -> Result<Vec<(&'a str, &'a str)>> {
        let body = self.body.ok_or_else(|| self.malformed("missing field list"))?;
        split_top_level(body)
            .into_iter()
            .filter(|field| !field.is_empty())
            .map(|field| {
                field
                    .split_once(':')
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .ok_or_else(|| self.malformed(format!("bad field `{field}`")))
            })
            .collect()
    }

    pub fn field(&self, key: &str) -> Result<&'a str> {
        self.fields()?
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| self.malformed(format!("missing field `{key}`")))
    }

    pub fn parse_field<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self.field(key)?;
        value
            .parse()
            .map_err(|_| self.malformed(format!("invalid `{key}` value `{value}`")))
    }

    /// Value of a trailing `<KEY=value>` annotation.
    pub fn generic_param<T: FromStr>(&self, key: &str) -> Result<T> {
        let pattern = format!("<{key}=");
        let start = self
            .suffix
            .find(&pattern)
            .ok_or_else(|| self.malformed(format!("missing `<{key}=..>`")))?
            + pattern.len();
        let end = self.suffix[start..]
            .find('>')
            .ok_or_else(|| self.malformed(format!("unterminated `<{key}=..>`")))?;
        let value = &self.suffix[start..start + end];
        value
            .parse()
            .map_err(|_| self.malformed(format!("invalid `{key}` value `{value}`")))
    }

    /// Checks the extension degree annotation `<D=2>`.
    pub fn expect_degree(&self, degree: usize) -> Result<()> {
        let d: usize = self.generic_param("D")?;
        if d != degree {
            return Err(self.malformed(format!("expected D={degree}, found D={d}")));
        }
        Ok(())
    }
}

fn matching_close(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '<' | '(' | '{' => depth += 1,
            ']' | '>' | ')' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Parses `[1, 2, 3]`.
pub(crate) fn parse_u64_list(gate: &GateId, value: &str) -> Result<Vec<u64>> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| gate.malformed(format!("expected a list, found `{value}`")))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| gate.malformed(format!("invalid list entry `{s}`")))
        })
        .collect()
}
