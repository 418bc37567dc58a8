//! Minimal reader and writer for HEALPix maps stored as FITS binary tables.
//!
//! Only what HEALPix maps use is supported: the first column of the first
//! `BINTABLE` extension, with numeric `TFORM` codes `E`, `D`, `J`, `I` and `K`.

use std::path::Path;

use crate::error::{Cmb2SphereError, Result};
use crate::field::ScalarField;
use crate::healpix::Nside;

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// Header keywords of one HDU, in file order.
#[derive(Debug, Default)]
struct Header {
    cards: Vec<(String, String)>,
}

impl Header {
    fn get(&self, key: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn int(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Cmb2SphereError::invalid_fits(format!("{key} = '{v}' is not an integer")))
            })
            .transpose()
    }

    fn required_int(&self, key: &str) -> Result<i64> {
        self.int(key)?
            .ok_or_else(|| Cmb2SphereError::invalid_fits(format!("missing keyword {key}")))
    }

    fn float(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.replace('D', "E")
                    .parse::<f64>()
                    .map_err(|_| Cmb2SphereError::invalid_fits(format!("{key} = '{v}' is not a number")))
            })
            .transpose()
    }

    /// Size in bytes of the data unit following this header.
    fn data_len(&self) -> Result<usize> {
        let naxis = self.required_int("NAXIS")?;
        if naxis == 0 {
            return Ok(0);
        }
        let bitpix = self.required_int("BITPIX")?;
        let overflow = || Cmb2SphereError::invalid_fits("data size overflows");
        let mut elements: i64 = 1;
        for axis in 1..=naxis {
            elements = elements
                .checked_mul(self.required_int(&format!("NAXIS{axis}"))?)
                .ok_or_else(overflow)?;
        }
        let pcount = self.int("PCOUNT")?.unwrap_or(0);
        let gcount = self.int("GCOUNT")?.unwrap_or(1);
        let bytes = pcount
            .checked_add(elements)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.abs() / 8))
            .ok_or_else(overflow)?;
        usize::try_from(bytes)
            .map_err(|_| Cmb2SphereError::invalid_fits(format!("negative data size {bytes}")))
    }
}

/// Parses one header starting at `offset`; returns it and the data offset.
fn parse_header(bytes: &[u8], offset: usize) -> Result<(Header, usize)> {
    let mut header = Header::default();
    let mut pos = offset;
    loop {
        let card = bytes
            .get(pos..pos + CARD)
            .ok_or_else(|| Cmb2SphereError::invalid_fits("header ends before END card"))?;
        pos += CARD;
        if !card.is_ascii() {
            return Err(Cmb2SphereError::invalid_fits("header is not ASCII"));
        }
        let card = String::from_utf8_lossy(card);
        let key = card[..8].trim_end();
        if key == "END" {
            break;
        }
        if &card[8..10] == "= " {
            header
                .cards
                .push((key.to_string(), parse_value(&card[10..])));
        }
    }
    Ok((header, pad_to_block(pos)))
}

/// Extracts a card value: a quoted string or everything before the comment.
fn parse_value(raw: &str) -> String {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return value.trim_end().to_string();
    }
    raw.split('/').next().unwrap_or("").trim().to_string()
}

fn pad_to_block(len: usize) -> usize {
    len.div_ceil(BLOCK) * BLOCK
}

/// Numeric column types found in HEALPix maps.
#[derive(Debug, Clone, Copy)]
enum ColumnType {
    F32,
    F64,
    I16,
    I32,
    I64,
}

impl ColumnType {
    fn from_code(code: char) -> Option<Self> {
        match code {
            'E' => Some(Self::F32),
            'D' => Some(Self::F64),
            'I' => Some(Self::I16),
            'J' => Some(Self::I32),
            'K' => Some(Self::I64),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// Decodes one big-endian element; `bytes` has exactly `size()` bytes.
    #[allow(clippy::cast_precision_loss)]
    fn decode(self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        match self {
            Self::F32 => f64::from(f32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
            Self::F64 => f64::from_be_bytes(buf),
            Self::I16 => f64::from(i16::from_be_bytes([buf[0], buf[1]])),
            Self::I32 => f64::from(i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
            Self::I64 => i64::from_be_bytes(buf) as f64,
        }
    }
}

/// Splits a `TFORM` value such as `1024E` into repeat count and type.
fn parse_tform(tform: &str) -> Result<(usize, ColumnType)> {
    let tform = tform.trim();
    let split = tform
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Cmb2SphereError::invalid_fits(format!("TFORM1 '{tform}' has no type code")))?;
    let repeat = if split == 0 {
        1
    } else {
        tform[..split]
            .parse()
            .map_err(|_| Cmb2SphereError::invalid_fits(format!("bad repeat count in '{tform}'")))?
    };
    let code = tform[split..].chars().next().unwrap_or(' ');
    let ty = ColumnType::from_code(code).ok_or_else(|| {
        Cmb2SphereError::invalid_fits(format!("unsupported column type '{code}' in TFORM1"))
    })?;
    Ok((repeat, ty))
}

/// Reads the first column of a HEALPix FITS map as a RING-ordered field.
pub fn read_healpix_map(path: &Path) -> Result<ScalarField> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Cmb2SphereError::MissingInput {
                path: path.to_path_buf(),
            }
        } else {
            Cmb2SphereError::IoError(e)
        }
    })?;
    if !bytes.starts_with(b"SIMPLE  =") {
        return Err(Cmb2SphereError::invalid_fits(format!(
            "{} is not a FITS file",
            path.display()
        )));
    }

    let mut offset = 0;
    let (header, data_start) = loop {
        if offset >= bytes.len() {
            return Err(Cmb2SphereError::invalid_fits("no BINTABLE extension found"));
        }
        let (header, data_start) = parse_header(&bytes, offset)?;
        if header.get("XTENSION") == Some("BINTABLE") {
            break (header, data_start);
        }
        offset = data_start
            .checked_add(pad_to_block(header.data_len()?))
            .ok_or_else(|| Cmb2SphereError::invalid_fits("data size overflows"))?;
    };

    let values = read_first_column(&header, &bytes, data_start)?;
    let values = apply_scaling(&header, values)?;

    if header
        .get("INDXSCHM")
        .is_some_and(|s| s.eq_ignore_ascii_case("EXPLICIT"))
    {
        return Err(Cmb2SphereError::invalid_fits(
            "explicit-index (partial sky) maps are not supported",
        ));
    }

    let nside = match header.int("NSIDE")? {
        Some(n) => {
            let n = u32::try_from(n)
                .map_err(|_| Cmb2SphereError::invalid_fits(format!("NSIDE {n} out of range")))?;
            Nside::new(n)?
        }
        None => Nside::from_pixel_count(values.len())?,
    };
    if values.len() != nside.pixel_count() {
        return Err(Cmb2SphereError::ResolutionMismatch {
            expected: nside.pixel_count(),
            actual: values.len(),
        });
    }

    let ordering = header.get("ORDERING").unwrap_or("RING").to_ascii_uppercase();
    let values = match ordering.as_str() {
        "RING" => values,
        "NESTED" if !nside.supports_nested() => {
            return Err(Cmb2SphereError::invalid_fits(format!(
                "NESTED ordering needs a power-of-two nside, got {nside}"
            )))
        }
        "NESTED" => {
            let mut ring = vec![0.0; values.len()];
            for (nest, value) in values.into_iter().enumerate() {
                ring[nside.nest_to_ring(nest)] = value;
            }
            ring
        }
        other => {
            return Err(Cmb2SphereError::invalid_fits(format!(
                "unknown pixel ordering '{other}'"
            )))
        }
    };

    log::info!(
        "read {} map with nside={nside} from {}",
        ordering,
        path.display()
    );
    ScalarField::new(nside, values)
}

fn read_first_column(header: &Header, bytes: &[u8], data_start: usize) -> Result<Vec<f64>> {
    let to_usize = |key: &str, v: i64| {
        usize::try_from(v).map_err(|_| Cmb2SphereError::invalid_fits(format!("{key} = {v} is negative")))
    };
    let row_len = to_usize("NAXIS1", header.required_int("NAXIS1")?)?;
    let rows = to_usize("NAXIS2", header.required_int("NAXIS2")?)?;
    let tform = header
        .get("TFORM1")
        .ok_or_else(|| Cmb2SphereError::invalid_fits("missing keyword TFORM1"))?;
    let (repeat, ty) = parse_tform(tform)?;
    if row_len == 0 || repeat == 0 {
        return Err(Cmb2SphereError::invalid_fits(format!(
            "empty table column (NAXIS1 = {row_len}, TFORM1 = '{tform}')"
        )));
    }
    let cell = repeat
        .checked_mul(ty.size())
        .ok_or_else(|| Cmb2SphereError::invalid_fits(format!("column '{tform}' is too wide")))?;
    if cell > row_len {
        return Err(Cmb2SphereError::invalid_fits(format!(
            "column of {cell} bytes does not fit a {row_len}-byte row"
        )));
    }

    let data = rows
        .checked_mul(row_len)
        .and_then(|len| data_start.checked_add(len))
        .and_then(|end| bytes.get(data_start..end))
        .ok_or_else(|| Cmb2SphereError::invalid_fits("table data is truncated"))?;

    let mut values = Vec::with_capacity(rows * repeat);
    for row in data.chunks_exact(row_len) {
        values.extend(row[..cell].chunks_exact(ty.size()).map(|e| ty.decode(e)));
    }
    Ok(values)
}

fn apply_scaling(header: &Header, mut values: Vec<f64>) -> Result<Vec<f64>> {
    let scale = header.float("TSCAL1")?.unwrap_or(1.0);
    let zero = header.float("TZERO1")?.unwrap_or(0.0);
    if scale != 1.0 || zero != 0.0 {
        for v in &mut values {
            *v = *v * scale + zero;
        }
    }
    Ok(values)
}

/// Header card builder, padded to 80 columns.
fn card(key: &str, value: &str) -> String {
    format!("{key:<8}= {value:>20}").chars().chain(std::iter::repeat(' ')).take(CARD).collect()
}

fn string_card(key: &str, value: &str) -> String {
    card(key, &format!("{:<20}", format!("'{value:<8}'")))
}

fn push_header(out: &mut Vec<u8>, cards: &[String]) {
    for c in cards {
        out.extend_from_slice(c.as_bytes());
    }
    out.extend_from_slice(format!("{:<80}", "END").as_bytes());
    out.resize(pad_to_block(out.len()), b' ');
}

/// Writes a full-sky RING map as a single-column `D` binary table.
pub fn write_healpix_map(path: &Path, field: &ScalarField) -> Result<()> {
    let npix = field.len();
    let mut out = Vec::with_capacity(2 * BLOCK + pad_to_block(npix * 8));

    push_header(
        &mut out,
        &[
            card("SIMPLE", "T"),
            card("BITPIX", "8"),
            card("NAXIS", "0"),
            card("EXTEND", "T"),
        ],
    );

    push_header(
        &mut out,
        &[
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "8"),
            card("NAXIS2", &npix.to_string()),
            card("PCOUNT", "0"),
            card("GCOUNT", "1"),
            card("TFIELDS", "1"),
            string_card("TTYPE1", "TEMPERATURE"),
            string_card("TFORM1", "D"),
            string_card("PIXTYPE", "HEALPIX"),
            string_card("ORDERING", "RING"),
            card("NSIDE", &field.nside().to_string()),
            card("FIRSTPIX", "0"),
            card("LASTPIX", &(npix - 1).to_string()),
            string_card("INDXSCHM", "IMPLICIT"),
        ],
    );

    let data_start = out.len();
    for v in field.values() {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.resize(data_start + pad_to_block(npix * 8), 0);

    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(nside: u32) -> ScalarField {
        let nside = Nside::new(nside).unwrap();
        let values = (0..nside.pixel_count()).map(|p| p as f64 * 0.5 - 3.0).collect();
        ScalarField::new(nside, values).unwrap()
    }

    /// Builds a one-column table with the given header cards and raw data.
    fn table_file(cards: &[String], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        push_header(&mut out, &[card("SIMPLE", "T"), card("BITPIX", "8"), card("NAXIS", "0")]);
        push_header(&mut out, cards);
        out.extend_from_slice(data);
        out.resize(pad_to_block(out.len()), 0);
        out
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.fits");
        let field = ramp(4);
        write_healpix_map(&path, &field).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() % BLOCK, 0);
        assert_eq!(read_healpix_map(&path).unwrap(), field);
    }

    #[test]
    fn test_nested_float_column_is_reordered() {
        let nside = Nside::new(2).unwrap();
        let npix = nside.pixel_count();
        // Value at NESTED index p is p; four pixels per row.
        let mut data = Vec::new();
        for p in 0..npix {
            data.extend_from_slice(&(p as f32).to_be_bytes());
        }
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "16"),
            card("NAXIS2", &(npix / 4).to_string()),
            card("PCOUNT", "0"),
            card("GCOUNT", "1"),
            card("TFIELDS", "1"),
            string_card("TFORM1", "4E"),
            string_card("ORDERING", "NESTED"),
            card("NSIDE", "2"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.fits");
        std::fs::write(&path, table_file(&cards, &data)).unwrap();

        let field = read_healpix_map(&path).unwrap();
        for p in 0..npix {
            assert_eq!(field.values()[nside.nest_to_ring(p)], p as f64);
        }
    }

    #[test]
    fn test_scaled_integer_column_without_nside() {
        let mut data = Vec::new();
        for p in 0..12i16 {
            data.extend_from_slice(&p.to_be_bytes());
        }
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "2"),
            card("NAXIS2", "12"),
            card("TFIELDS", "1"),
            string_card("TFORM1", "I"),
            card("TSCAL1", "0.5"),
            card("TZERO1", "1.0"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaled.fits");
        std::fs::write(&path, table_file(&cards, &data)).unwrap();

        let field = read_healpix_map(&path).unwrap();
        assert_eq!(field.nside().get(), 1);
        assert_eq!(field.values()[3], 2.5);
    }

    #[test]
    fn test_nside_disagrees_with_pixel_count() {
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "8"),
            card("NAXIS2", "12"),
            card("TFIELDS", "1"),
            string_card("TFORM1", "D"),
            card("NSIDE", "2"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.fits");
        std::fs::write(&path, table_file(&cards, &[0u8; 96])).unwrap();
        assert!(matches!(
            read_healpix_map(&path),
            Err(Cmb2SphereError::ResolutionMismatch {
                expected: 48,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_missing_and_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.fits");
        assert!(matches!(
            read_healpix_map(&missing),
            Err(Cmb2SphereError::MissingInput { .. })
        ));

        let garbage = dir.path().join("garbage.fits");
        std::fs::write(&garbage, b"not a fits file").unwrap();
        assert!(matches!(
            read_healpix_map(&garbage),
            Err(Cmb2SphereError::InvalidFits(_))
        ));
    }

    #[test]
    fn test_nested_map_needs_power_of_two_nside() {
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "8"),
            card("NAXIS2", "108"),
            card("TFIELDS", "1"),
            string_card("TFORM1", "D"),
            string_card("ORDERING", "NESTED"),
            card("NSIDE", "3"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested3.fits");
        std::fs::write(&path, table_file(&cards, &[0u8; 108 * 8])).unwrap();
        assert!(matches!(
            read_healpix_map(&path),
            Err(Cmb2SphereError::InvalidFits(_))
        ));

        // The same pixels in RING order are a valid map.
        let mut ring_cards = cards.to_vec();
        ring_cards[7] = string_card("ORDERING", "RING");
        std::fs::write(&path, table_file(&ring_cards, &[0u8; 108 * 8])).unwrap();
        assert_eq!(read_healpix_map(&path).unwrap().nside().get(), 3);
    }

    #[test]
    fn test_zero_row_length_is_rejected() {
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", "0"),
            card("NAXIS2", "12"),
            card("TFIELDS", "1"),
            string_card("TFORM1", "0D"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty-row.fits");
        std::fs::write(&path, table_file(&cards, &[])).unwrap();
        assert!(matches!(
            read_healpix_map(&path),
            Err(Cmb2SphereError::InvalidFits(_))
        ));
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let huge = i64::MAX.to_string();
        let dir = tempfile::tempdir().unwrap();

        // Skipping a primary array whose size overflows.
        let mut bytes = Vec::new();
        push_header(
            &mut bytes,
            &[
                card("SIMPLE", "T"),
                card("BITPIX", "-64"),
                card("NAXIS", "2"),
                card("NAXIS1", &huge),
                card("NAXIS2", &huge),
            ],
        );
        let path = dir.path().join("huge-primary.fits");
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            read_healpix_map(&path),
            Err(Cmb2SphereError::InvalidFits(_))
        ));

        // A table whose rows times row length overflows.
        let cards = [
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", &huge),
            card("NAXIS2", &huge),
            card("TFIELDS", "1"),
            string_card("TFORM1", "D"),
        ];
        let path = dir.path().join("huge-table.fits");
        std::fs::write(&path, table_file(&cards, &[])).unwrap();
        assert!(matches!(
            read_healpix_map(&path),
            Err(Cmb2SphereError::InvalidFits(_))
        ));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(" 'RING    '           / ordering"), "RING");
        assert_eq!(parse_value("                1024 / nside"), "1024");
        assert_eq!(parse_value("'it''s'"), "it's");
    }
}
