use model::query::QueryResult;
use std::io::{self, Write};

/// Writes the column header, then one JSON array per row.
pub fn write_result<W: Write>(out: &mut W, result: &QueryResult) -> io::Result<()> {
    serde_json::to_writer(&mut *out, result.columns())?;
    out.write_all(b"\n")?;
    for row in result.rows() {
        serde_json::to_writer(&mut *out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
