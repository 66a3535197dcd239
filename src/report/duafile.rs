//! DUA file and DUA index file parsing.
//!
//! The DUA file carries the associations and their branch-requirement sets;
//! the index file maps each DUA to the byte offset of its cell in the
//! runtime DUA array. Both start with the mode marker (`H` hybrid, `N`
//! direct), which the classifier needs to merge inferred and directly
//! recorded results without double counting.

use crate::{Error, Result};

/// One association as read back from the DUA file.
#[derive(Debug, Clone)]
pub struct DuaRecord {
    /// `true` if the use has a single reaching definition.
    pub inferable: bool,
    /// Name in `var@defStmt->useStmt` form.
    pub name: String,
    /// Branch indices reaching the definition.
    pub reach_def: Vec<u32>,
    /// Branch indices reaching the use.
    pub reach_use: Vec<u32>,
    /// Branches that definitely kill the definition en route.
    pub in_order_kill: Vec<u32>,
    /// Branches that may kill the definition depending on order.
    pub not_in_order_kill: Vec<u32>,
}

impl DuaRecord {
    /// Splits the name into (variable, definition statement, use statement).
    #[must_use]
    pub fn parse_name(&self) -> Option<(&str, u32, u32)> {
        let (var, stmts) = self.name.rsplit_once('@')?;
        let (def, use_) = stmts.split_once("->")?;
        Some((
            var,
            def.strip_prefix('s')?.parse().ok()?,
            use_.strip_prefix('s')?.parse().ok()?,
        ))
    }
}

/// The parsed DUA file.
#[derive(Debug, Clone)]
pub struct DuaFile {
    /// `true` if the plan was built in hybrid mode.
    pub hybrid: bool,
    /// Associations in file order.
    pub duas: Vec<DuaRecord>,
}

/// The parsed DUA index file.
#[derive(Debug, Clone)]
pub struct DuaIndex {
    /// `true` if the plan was built in hybrid mode.
    pub hybrid: bool,
    /// Byte offset into the DUA array per DUA, in DUA-file order.
    pub offsets: Vec<u32>,
}

fn parse_error(message: impl Into<String>, line: usize) -> Error {
    Error::Parse {
        message: message.into(),
        line,
    }
}

fn parse_marker(line: Option<&str>) -> Result<bool> {
    match line.map(str::trim) {
        Some("H") => Ok(true),
        Some("N") => Ok(false),
        other => Err(parse_error(
            format!("bad mode marker {other:?}"),
            1,
        )),
    }
}

fn parse_ids(text: &str, line: usize) -> Result<Vec<u32>> {
    text.split_whitespace()
        .map(|id| {
            id.parse::<u32>()
                .map_err(|_| parse_error(format!("bad branch id '{id}'"), line))
        })
        .collect()
}

/// Parses the DUA file: the mode marker, then five lines per DUA.
///
/// # Errors
///
/// Returns [`Error::Parse`] on a bad marker, a truncated record, or a
/// malformed ID list.
pub fn parse_dua_file(text: &str) -> Result<DuaFile> {
    let mut lines = text.lines();
    let hybrid = parse_marker(lines.next())?;
    let mut line_no = 1;

    let mut duas = Vec::new();
    while let Some(header) = lines.next() {
        line_no += 1;
        let header = header.trim();
        if header.is_empty() {
            continue;
        }
        let (marker, name) = header
            .split_once(' ')
            .ok_or_else(|| parse_error("missing DUA name", line_no))?;
        let inferable = match marker {
            "+" => true,
            "-" => false,
            other => {
                return Err(parse_error(
                    format!("bad inferability marker '{other}'"),
                    line_no,
                ))
            }
        };

        let mut sets: [Vec<u32>; 4] = Default::default();
        for set in &mut sets {
            let ids = lines
                .next()
                .ok_or_else(|| parse_error("truncated DUA record", line_no))?;
            line_no += 1;
            *set = parse_ids(ids, line_no)?;
        }
        let [reach_def, reach_use, in_order_kill, not_in_order_kill] = sets;
        duas.push(DuaRecord {
            inferable,
            name: name.to_owned(),
            reach_def,
            reach_use,
            in_order_kill,
            not_in_order_kill,
        });
    }

    Ok(DuaFile { hybrid, duas })
}

/// Parses the DUA index file: the mode marker, then one byte offset per DUA.
///
/// # Errors
///
/// Returns [`Error::Parse`] on a bad marker or a non-numeric offset.
pub fn parse_index_file(text: &str) -> Result<DuaIndex> {
    let mut lines = text.lines();
    let hybrid = parse_marker(lines.next())?;

    let mut offsets = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        offsets.push(
            line.parse::<u32>()
                .map_err(|_| parse_error(format!("bad offset '{line}'"), idx + 2))?,
        );
    }
    Ok(DuaIndex { hybrid, offsets })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_written_files() {
        use crate::cfg::StmtId;
        use crate::instrument::{Dua, DuaPlan, VarStorage};

        let duas = vec![
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(0),
                use_stmt: StmtId(9),
                reach_def: vec![0],
                reach_use: vec![1, 2],
                in_order_kill: vec![3],
                not_in_order_kill: Vec::new(),
            },
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(4),
                use_stmt: StmtId(9),
                reach_def: vec![2],
                reach_use: vec![1, 2],
                in_order_kill: Vec::new(),
                not_in_order_kill: vec![3],
            },
        ];
        let plan = DuaPlan::compute(duas, true, 4).unwrap();

        let mut dua_out = Vec::new();
        plan.write_dua_file(&mut dua_out).unwrap();
        let file = parse_dua_file(&String::from_utf8(dua_out).unwrap()).unwrap();

        assert!(file.hybrid);
        assert_eq!(file.duas.len(), 2);
        assert_eq!(file.duas[0].name, "x@s0->s9");
        assert!(!file.duas[0].inferable);
        assert_eq!(file.duas[0].reach_use, vec![1, 2]);
        assert_eq!(file.duas[1].not_in_order_kill, vec![3]);
        assert_eq!(file.duas[1].parse_name(), Some(("x", 4, 9)));

        let mut idx_out = Vec::new();
        plan.write_index_file(&mut idx_out).unwrap();
        let index = parse_index_file(&String::from_utf8(idx_out).unwrap()).unwrap();
        assert!(index.hybrid);
        assert_eq!(index.offsets, vec![0, 4]);
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let err = parse_dua_file("N\n- x@s0->s1\n0\n1\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_bad_marker_is_an_error() {
        assert!(matches!(
            parse_dua_file("X\n").unwrap_err(),
            Error::Parse { line: 1, .. }
        ));
        assert!(matches!(
            parse_index_file("").unwrap_err(),
            Error::Parse { line: 1, .. }
        ));
    }
}
