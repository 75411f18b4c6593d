use derive_more::Display;
use snafu::Snafu;
use tracing::{debug, warn};

use crate::locks::LockRecord;

const LOCK_ID_PREFIX: &str = "ID:";

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ParseWarningReason {
    #[display("expected '<path> <owner> ID:<id>'")]
    MissingColumns,
    #[display("lock id column must look like 'ID:<id>'")]
    MalformedLockId,
    #[display("path column is empty")]
    EmptyPath,
}

/// A line of tool output that could not be turned into a lock record.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Skipped lock line {line_number} ('{line}'): {reason}"))]
pub struct ParseWarning {
    pub line_number: usize,
    pub line: String,
    pub reason: ParseWarningReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLocks {
    pub records: Vec<LockRecord>,
    pub warnings: Vec<ParseWarning>,
    saw_content: bool,
}

impl ParsedLocks {
    /// Skipped lines only matter to the user when they swallowed everything.
    pub fn should_surface_warnings(&self) -> bool {
        self.saw_content && self.records.is_empty() && !self.warnings.is_empty()
    }
}

/// Parses the line-oriented output of `git lfs locks`.
///
/// Columns are separated by runs of whitespace. The lock id is the last
/// column and the owner the one before it, so paths containing spaces keep
/// their inner spacing. Lines that do not fit are skipped and reported as
/// [`ParseWarning`]s instead of failing the batch.
pub fn parse_lock_lines<I, S>(lines: I) -> ParsedLocks
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = ParsedLocks::default();

    for (index, line) in lines.into_iter().enumerate() {
        let trimmed = line.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        parsed.saw_content = true;

        match parse_lock_line(trimmed) {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                let warning = ParseWarning {
                    line_number: index + 1,
                    line: trimmed.to_string(),
                    reason,
                };
                debug!("{}", warning);
                parsed.warnings.push(warning);
            }
        }
    }

    if parsed.should_surface_warnings() {
        warn!(
            "None of the {} lock lines could be parsed",
            parsed.warnings.len()
        );
    }

    parsed
}

fn parse_lock_line(line: &str) -> Result<LockRecord, ParseWarningReason> {
    let (rest, id_column) = line
        .rsplit_once(char::is_whitespace)
        .ok_or(ParseWarningReason::MissingColumns)?;

    let lock_id = id_column
        .strip_prefix(LOCK_ID_PREFIX)
        .filter(|id| !id.is_empty())
        .ok_or(ParseWarningReason::MalformedLockId)?;

    let (path, owner) = rest
        .trim_end()
        .rsplit_once(char::is_whitespace)
        .ok_or(ParseWarningReason::MissingColumns)?;

    if owner.starts_with(LOCK_ID_PREFIX) {
        return Err(ParseWarningReason::MissingColumns);
    }

    let record = LockRecord::new(path, owner, lock_id);
    if record.path.is_empty() {
        return Err(ParseWarningReason::EmptyPath);
    }

    Ok(record)
}
