//! Text-protocol result set decoding
//!
//! A `COM_QUERY` response is a column count, one column definition per
//! column, an EOF packet, zero or more rows and a terminating EOF (or ERR).

use bytes::Bytes;

use super::wire::WireReader;

/// Decode the column count packet that opens a result set
pub fn parse_column_count(payload: &[u8]) -> Option<usize> {
    let mut r = WireReader::new(payload);
    let count = r.lenenc_int()?;
    usize::try_from(count).ok()
}

/// Extract the column alias from a ColumnDefinition41 packet
///
/// Layout: catalog, schema, table, org_table, name, org_name, fixed fields.
/// Only `name` is needed to label status values.
pub fn parse_column_name(payload: &[u8]) -> Option<String> {
    let mut r = WireReader::new(payload);
    for _ in 0..4 {
        r.lenenc_bytes()?;
    }
    let name = r.lenenc_bytes()??;
    Some(String::from_utf8_lossy(name).into_owned())
}

/// Split a text-protocol row into raw column values
///
/// Each value is a length-encoded string or the 0xFB NULL marker (`None`).
/// Returns `None` when the payload holds fewer values than `column_count`.
pub fn parse_text_row(payload: &Bytes, column_count: usize) -> Option<Vec<Option<Bytes>>> {
    let mut r = WireReader::new(payload);
    let mut values = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let value = r.lenenc_bytes()?.map(|raw| payload.slice_ref(raw));
        values.push(value);
    }
    Some(values)
}
