//! IdRange - `ST001-ST010` 形式の連続 ID 範囲
//!
//! 数字サフィックスをインクリメントし、ゼロ埋め幅を維持します
//! （`ST009` → `ST010`、`ST999` → `ST1000`）。

use super::errors::CertError;
use super::ids::Identifier;

/// Split an identifier into its prefix and numeric suffix.
fn split_numeric(id: &str) -> Option<(&str, &str)> {
    let digits = id.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    Some(id.split_at(id.len() - digits))
}

/// Next identifier in sequence, preserving zero padding.
pub fn next_id(current: &Identifier) -> Result<Identifier, CertError> {
    let (prefix, digits) = split_numeric(current.as_str())
        .ok_or_else(|| CertError::InvalidIdentifier(current.to_string()))?;
    let value: u64 = digits
        .parse()
        .map_err(|_| CertError::InvalidIdentifier(current.to_string()))?;
    let next = value
        .checked_add(1)
        .ok_or_else(|| CertError::InvalidIdentifier(current.to_string()))?;
    Identifier::parse(format!("{prefix}{next:0width$}", width = digits.len()))
}

/// Inclusive range of identifiers sharing one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRange {
    start: Identifier,
    end: Identifier,
}

impl IdRange {
    /// Parse `ST001` (single id) or `ST001-ST010`.
    ///
    /// Identifiers may contain `-` themselves (`ST-001`, `ST-001-ST-010`).
    /// A `-` separates a range only where both sides are identifiers with a
    /// numeric suffix; otherwise the whole input is one identifier.
    pub fn parse(raw: &str) -> Result<Self, CertError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('-') || trimmed.ends_with('-') {
            return Err(CertError::InvalidIdentifier(raw.to_string()));
        }

        let splits: Vec<(Identifier, Identifier)> = trimmed
            .match_indices('-')
            .filter_map(|(at, _)| {
                let start = Identifier::parse(&trimmed[..at]).ok()?;
                let end = Identifier::parse(&trimmed[at + 1..]).ok()?;
                split_numeric(start.as_str())?;
                split_numeric(end.as_str())?;
                Some((start, end))
            })
            .collect();

        if splits.is_empty() {
            let id = Identifier::parse(trimmed)?;
            return Ok(Self {
                start: id.clone(),
                end: id,
            });
        }

        // 候補が複数あっても成立する範囲は高々一つ
        splits
            .into_iter()
            .find(|(start, end)| is_ordered_range(start, end))
            .map(|(start, end)| Self { start, end })
            .ok_or_else(|| CertError::InvalidIdentifier(raw.to_string()))
    }

    pub fn start(&self) -> &Identifier {
        &self.start
    }

    pub fn end(&self) -> &Identifier {
        &self.end
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Every identifier from start to end, inclusive.
    pub fn expand(&self) -> Result<Vec<Identifier>, CertError> {
        let mut ids = vec![self.start.clone()];
        let mut current = self.start.clone();
        while current != self.end {
            current = next_id(&current)?;
            // ST09-ST100 のように幅が揃わない範囲でも数値で終端を判定する
            if numeric_value(&current) > numeric_value(&self.end) {
                return Err(CertError::InvalidIdentifier(format!(
                    "{}-{}",
                    self.start, self.end
                )));
            }
            ids.push(current.clone());
        }
        Ok(ids)
    }
}

/// Same prefix and `start <= end` numerically.
fn is_ordered_range(start: &Identifier, end: &Identifier) -> bool {
    let (Some((start_prefix, _)), Some((end_prefix, _))) =
        (split_numeric(start.as_str()), split_numeric(end.as_str()))
    else {
        return false;
    };
    match (numeric_value(start), numeric_value(end)) {
        (Some(start_value), Some(end_value)) => {
            start_prefix == end_prefix && start_value <= end_value
        }
        _ => false,
    }
}

fn numeric_value(id: &Identifier) -> Option<u64> {
    split_numeric(id.as_str()).and_then(|(_, digits)| digits.parse().ok())
}
