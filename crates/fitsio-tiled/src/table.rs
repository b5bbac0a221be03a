//! Binary table layout of a compressed image: column discovery, fixed cells,
//! and variable-length (`P`/`Q`) heap descriptors.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::header::{card_integer_value, card_string_value, Card};
use crate::pixel::read_integer;

/// Width of a variable-length array descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// 32-bit count and offset.
    P,
    /// 64-bit count and offset.
    Q,
}

/// A parsed `TFORMn` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFormat {
    pub repeat: usize,
    /// Element type code (`B`, `I`, `J`, `K`, `E`, `D`, ...). For
    /// variable-length columns this is the type of the heap elements.
    pub code: u8,
    pub descriptor: Option<Descriptor>,
}

/// Bytes per element for a binary table type code.
fn element_size(code: u8) -> Result<usize> {
    match code {
        b'L' | b'B' | b'A' => Ok(1),
        b'I' => Ok(2),
        b'J' | b'E' => Ok(4),
        b'K' | b'D' | b'C' => Ok(8),
        b'M' => Ok(16),
        b'X' => Ok(0),
        _ => Err(Error::MalformedHeader("unknown TFORM type code")),
    }
}

impl ColumnFormat {
    /// Bytes the column occupies in each row.
    pub fn width(&self) -> Result<usize> {
        Ok(match self.descriptor {
            Some(Descriptor::P) => 8 * self.repeat,
            Some(Descriptor::Q) => 16 * self.repeat,
            None if self.code == b'X' => self.repeat.div_ceil(8),
            None => self.repeat * element_size(self.code)?,
        })
    }
}

/// Parse a TFORMn value like `"1J"`, `"1D"`, `"1PB(200)"` or `"1QB"`.
pub fn parse_tform(s: &str) -> Result<ColumnFormat> {
    let s = s.trim();
    // Drop the optional (maxlen) suffix of variable-length arrays.
    let s = s.find('(').map_or(s, |paren| &s[..paren]);
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let repeat = if digits == 0 {
        1
    } else {
        s[..digits]
            .parse::<usize>()
            .map_err(|_| Error::MalformedHeader("bad TFORM repeat count"))?
    };
    let rest = &s.as_bytes()[digits..];
    let (descriptor, code) = match rest {
        [b'P', code] => (Some(Descriptor::P), *code),
        [b'Q', code] => (Some(Descriptor::Q), *code),
        [code] => (None, *code),
        _ => return Err(Error::MalformedHeader("bad TFORM value")),
    };
    element_size(code)?;
    Ok(ColumnFormat {
        repeat,
        code,
        descriptor,
    })
}

/// One table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Byte offset within a row.
    pub offset: usize,
    pub format: ColumnFormat,
}

/// Which column a tile's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    /// `COMPRESSED_DATA`, coded with the image's algorithm.
    Compressed,
    /// `GZIP_COMPRESSED_DATA`: gzip'd pixels the main algorithm could not take.
    Gzip,
    /// `UNCOMPRESSED_DATA`: raw pixels.
    Uncompressed,
}

/// Everything needed to decode one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor<'a> {
    /// Table row, equal to the tile index.
    pub row: usize,
    pub payload: &'a [u8],
    pub source: PayloadSource,
    /// `ZSCALE`, or 1 when the column is absent.
    pub bscale: f64,
    /// `ZZERO`, or 0 when the column is absent.
    pub bzero: f64,
    /// Whether the table carries a `ZSCALE` column at all.
    pub scaled: bool,
    /// `ZBLANK` cell, if the column exists.
    pub blank: Option<i64>,
}

/// Column positions and table geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// `NAXIS1`: bytes per row.
    pub row_len: usize,
    /// `NAXIS2`: number of rows.
    pub rows: usize,
    /// Offset of the heap from the start of the data segment (`THEAP`).
    pub heap_start: usize,
    /// `PCOUNT`: bytes following the rows.
    pub heap_len: usize,
    pub columns: Vec<Column>,
    compressed: usize,
    gzip: Option<usize>,
    uncompressed: Option<usize>,
    zscale: Option<usize>,
    zzero: Option<usize>,
    zblank: Option<usize>,
}

fn or_default<T>(result: Result<T>, default: T) -> Result<T> {
    match result {
        Err(Error::UnknownField(_)) => Ok(default),
        other => other,
    }
}

impl TableLayout {
    /// Scan `TTYPEn`/`TFORMn` once and record where every column lives.
    pub fn from_cards(cards: &[Card]) -> Result<Self> {
        let row_len = card_integer_value(cards, "NAXIS1").ok_or(Error::MissingKeyword("NAXIS1"))?;
        let rows = card_integer_value(cards, "NAXIS2").ok_or(Error::MissingKeyword("NAXIS2"))?;
        let tfields =
            card_integer_value(cards, "TFIELDS").ok_or(Error::MissingKeyword("TFIELDS"))?;
        let heap_len = card_integer_value(cards, "PCOUNT").unwrap_or(0);
        if row_len < 0 || rows < 0 || tfields < 0 || heap_len < 0 {
            return Err(Error::MalformedHeader("negative table dimension"));
        }
        let (row_len, rows) = (row_len as usize, rows as usize);
        let table_len = row_len
            .checked_mul(rows)
            .ok_or(Error::MalformedHeader("table size overflows"))?;
        let heap_start = match card_integer_value(cards, "THEAP") {
            Some(v) if v >= 0 => v as usize,
            Some(_) => return Err(Error::MalformedHeader("negative THEAP")),
            None => table_len,
        };

        let mut columns = Vec::with_capacity(tfields as usize);
        let mut offset = 0usize;
        for i in 1..=tfields as usize {
            let tform = card_string_value(cards, &format!("TFORM{i}"))
                .ok_or(Error::MissingKeyword("TFORMn"))?;
            let format = parse_tform(tform)?;
            let name = card_string_value(cards, &format!("TTYPE{i}"))
                .unwrap_or_default()
                .into();
            columns.push(Column {
                name,
                offset,
                format,
            });
            offset += format.width()?;
        }
        if offset > row_len {
            return Err(Error::MalformedHeader("column widths exceed NAXIS1"));
        }

        let find = |name: &str| columns.iter().position(|c| c.name == name);
        let compressed = find("COMPRESSED_DATA").ok_or(Error::UnknownField("COMPRESSED_DATA"))?;
        let gzip = find("GZIP_COMPRESSED_DATA");
        let uncompressed = find("UNCOMPRESSED_DATA");
        let zscale = find("ZSCALE");
        let zzero = find("ZZERO");
        let zblank = find("ZBLANK");
        for idx in [Some(compressed), gzip, uncompressed].into_iter().flatten() {
            if columns[idx].format.descriptor.is_none() {
                return Err(Error::MalformedHeader(
                    "tile data column is not variable-length",
                ));
            }
        }

        Ok(TableLayout {
            row_len,
            rows,
            heap_start,
            heap_len: heap_len as usize,
            columns,
            compressed,
            gzip,
            uncompressed,
            zscale,
            zzero,
            zblank,
        })
    }

    /// Bytes of the fixed-width part of the table.
    pub fn table_len(&self) -> usize {
        self.row_len * self.rows
    }

    fn cell<'a>(&self, data: &'a [u8], row: usize, column: usize) -> Result<&'a [u8]> {
        let col = &self.columns[column];
        let start = row * self.row_len + col.offset;
        data.get(start..start + col.format.width()?)
            .ok_or(Error::UnexpectedEof)
    }

    /// Read the `(element count, heap offset)` descriptor of a variable-length
    /// column.
    fn descriptor(&self, data: &[u8], row: usize, column: usize) -> Result<(usize, usize)> {
        let cell = self.cell(data, row, column)?;
        match self.columns[column].format.descriptor {
            Some(Descriptor::P) => Ok((
                read_integer(&cell[0..], 4) as u32 as usize,
                read_integer(&cell[4..], 4) as u32 as usize,
            )),
            Some(Descriptor::Q) => {
                let count = read_integer(&cell[0..], 8);
                let offset = read_integer(&cell[8..], 8);
                if count < 0 || offset < 0 {
                    return Err(Error::MalformedHeader("negative Q descriptor"));
                }
                Ok((count as usize, offset as usize))
            }
            None => Err(Error::MalformedHeader("column is not variable-length")),
        }
    }

    /// Heap bytes addressed by a variable-length cell.
    fn heap_bytes<'a>(&self, data: &'a [u8], row: usize, column: usize) -> Result<&'a [u8]> {
        let (count, offset) = self.descriptor(data, row, column)?;
        let len = count
            .checked_mul(element_size(self.columns[column].format.code)?)
            .ok_or(Error::UnexpectedEof)?;
        let start = self
            .heap_start
            .checked_add(offset)
            .ok_or(Error::UnexpectedEof)?;
        data.get(start..start.saturating_add(len))
            .ok_or(Error::UnexpectedEof)
    }

    fn scalar(&self, data: &[u8], row: usize, column: Option<usize>, name: &'static str) -> Result<f64> {
        let column = column.ok_or(Error::UnknownField(name))?;
        let cell = self.cell(data, row, column)?;
        match self.columns[column].format.code {
            b'D' => Ok(f64::from_be_bytes([
                cell[0], cell[1], cell[2], cell[3], cell[4], cell[5], cell[6], cell[7],
            ])),
            b'E' => Ok(f32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]) as f64),
            b'B' => Ok(read_integer(cell, 1) as f64),
            b'I' => Ok(read_integer(cell, 2) as f64),
            b'J' => Ok(read_integer(cell, 4) as f64),
            b'K' => Ok(read_integer(cell, 8) as f64),
            _ => Err(Error::MalformedHeader("non-numeric scaling column")),
        }
    }

    /// `ZSCALE` of a row.
    pub fn zscale(&self, data: &[u8], row: usize) -> Result<f64> {
        self.scalar(data, row, self.zscale, "ZSCALE")
    }

    /// `ZZERO` of a row.
    pub fn zzero(&self, data: &[u8], row: usize) -> Result<f64> {
        self.scalar(data, row, self.zzero, "ZZERO")
    }

    /// `ZBLANK` of a row.
    pub fn zblank(&self, data: &[u8], row: usize) -> Result<i64> {
        self.scalar(data, row, self.zblank, "ZBLANK").map(|v| v as i64)
    }

    /// Collect the payload and scaling of the tile stored in `row`.
    ///
    /// An empty `COMPRESSED_DATA` cell falls back to `GZIP_COMPRESSED_DATA`,
    /// then to `UNCOMPRESSED_DATA`.
    pub fn tile<'a>(&self, data: &'a [u8], row: usize) -> Result<TileDescriptor<'a>> {
        if row >= self.rows {
            return Err(Error::UnexpectedEof);
        }
        let mut payload = self.heap_bytes(data, row, self.compressed)?;
        let mut source = PayloadSource::Compressed;
        if payload.is_empty() {
            let fallbacks = [
                (self.gzip, PayloadSource::Gzip),
                (self.uncompressed, PayloadSource::Uncompressed),
            ];
            for (column, kind) in fallbacks {
                if let Some(column) = column {
                    let bytes = self.heap_bytes(data, row, column)?;
                    if !bytes.is_empty() {
                        payload = bytes;
                        source = kind;
                        break;
                    }
                }
            }
        }

        Ok(TileDescriptor {
            row,
            payload,
            source,
            bscale: or_default(self.zscale(data, row), 1.0)?,
            bzero: or_default(self.zzero(data, row), 0.0)?,
            scaled: self.zscale.is_some(),
            blank: or_default(self.zblank(data, row).map(Some), None)?,
        })
    }
}
