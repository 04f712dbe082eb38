//! Plain-text renderers for Gaia search results.
//!
//! Values a record does not carry (proper motion and parallax under
//! `NO_PM`, BP under `NO_GBP_MAG`, RP under `NO_GRP_MAG`) are left blank.

use std::io::{self, Write};

use crate::codec::GaiaStar;
use crate::search::{SearchCriteria, SearchResult, UNLIMITED};

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Csv,
    Tabular,
}

/// Which header blocks precede the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextHeaders {
    None,
    SearchParameters,
    #[default]
    TableColumns,
    SearchParametersAndTableColumns,
}

impl TextHeaders {
    fn parameters(self) -> bool {
        matches!(self, Self::SearchParameters | Self::SearchParametersAndTableColumns)
    }

    fn columns(self) -> bool {
        matches!(self, Self::TableColumns | Self::SearchParametersAndTableColumns)
    }
}

const CSV_PARAMETER_COLUMNS: &str = "center_ra,center_dec,radius,magnitude_low,magnitude_high,\
source_count_limit,inclusion_flags,exclusion_flags,any_flags";

const CSV_COLUMNS: &str =
    "ra,dec,parallax,pmra,pmdec,phot_g_mean_mag,phot_bp_mean_mag,phot_rp_mean_mag,flags";

const TABLE_COLUMNS: [&str; 4] = [
    "      α             δ            ϖ         μα*        μδ       G     G_BP   G_RP   Flags",
    "------------- ------------- ---------- ---------- ---------- ------ ------ ------ --------",
    "   °             °               mas       mas/yr     mas/yr   mag    mag    mag",
    "============= ============= ========== ========== ========== ====== ====== ====== ========",
];

/// Write `result` in `format`.
///
/// `title` names the catalog in the tabular parameter header, e.g.
/// `"Gaia DR3"`.
pub fn write_results<W: Write>(
    out: &mut W,
    format: TextFormat,
    headers: TextHeaders,
    title: &str,
    criteria: &SearchCriteria,
    result: &SearchResult<GaiaStar>,
) -> io::Result<()> {
    match format {
        TextFormat::Csv => write_csv(out, headers, criteria, result),
        TextFormat::Tabular => write_table(out, headers, title, criteria, result),
    }
}

pub fn write_csv<W: Write>(
    out: &mut W,
    headers: TextHeaders,
    criteria: &SearchCriteria,
    result: &SearchResult<GaiaStar>,
) -> io::Result<()> {
    if headers.parameters() {
        writeln!(out, "{}", CSV_PARAMETER_COLUMNS)?;
        let limit = if criteria.source_limit == UNLIMITED {
            String::new()
        } else {
            criteria.source_limit.to_string()
        };
        writeln!(
            out,
            "{:.9},{:.9},{:.9},{:.3},{:.3},{},{:x},{:x},{:x}",
            criteria.center_ra,
            criteria.center_dec,
            criteria.radius,
            criteria.magnitude_low,
            criteria.magnitude_high,
            limit,
            criteria.inclusion_flags,
            criteria.exclusion_flags,
            criteria.any_flags
        )?;
    }
    if headers.columns() {
        writeln!(out, "{}", CSV_COLUMNS)?;
    }
    for star in &result.stars {
        write_csv_row(out, star)?;
    }
    Ok(())
}

fn write_csv_row<W: Write>(out: &mut W, star: &GaiaStar) -> io::Result<()> {
    write!(out, "{:.9},{:.9},", star.ra, star.dec)?;
    if star.has_proper_motion() {
        write!(out, "{:.4},{:.4},{:.4},", star.parallax, star.pmra, star.pmdec)?;
    } else {
        write!(out, ",,,")?;
    }
    write!(out, "{:.3},", star.mag_g)?;
    if star.has_bp() {
        write!(out, "{:.3}", star.mag_bp)?;
    }
    write!(out, ",")?;
    if star.has_rp() {
        write!(out, "{:.3}", star.mag_rp)?;
    }
    writeln!(out, ",{:x}", star.flags)
}

pub fn write_table<W: Write>(
    out: &mut W,
    headers: TextHeaders,
    title: &str,
    criteria: &SearchCriteria,
    result: &SearchResult<GaiaStar>,
) -> io::Result<()> {
    if headers.parameters() {
        let heading = format!("{} Search", title);
        writeln!(out, "{}", heading)?;
        writeln!(out, "{}", "=".repeat(heading.chars().count()))?;
        writeln!(out, "Total sources .............. {}", result.stars.len())?;
        writeln!(out, "{}", criteria)?;
        writeln!(out)?;
    }
    if headers.columns() {
        for line in TABLE_COLUMNS {
            writeln!(out, "{}", line)?;
        }
    }
    for star in &result.stars {
        write!(out, "{:13.9} {:+13.9} ", star.ra, star.dec)?;
        if star.has_proper_motion() {
            write!(
                out,
                "{:10.4} {:+10.4} {:+10.4} ",
                star.parallax, star.pmra, star.pmdec
            )?;
        } else {
            write!(out, "{:32} ", "")?;
        }
        write!(out, "{:6.3} ", star.mag_g)?;
        if star.has_bp() {
            write!(out, "{:6.3} ", star.mag_bp)?;
        } else {
            write!(out, "{:6} ", "")?;
        }
        if star.has_rp() {
            write!(out, "{:6.3} ", star.mag_rp)?;
        } else {
            write!(out, "{:6} ", "")?;
        }
        writeln!(out, "{:08x}", star.flags)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::gaia::flags;

    fn full_star() -> GaiaStar {
        GaiaStar {
            ra: 10.5,
            dec: -3.25,
            parallax: 1.5,
            pmra: 2.25,
            pmdec: -0.5,
            mag_g: 12.125,
            mag_bp: 12.5,
            mag_rp: 11.75,
            flags: 0x10,
        }
    }

    fn result(stars: Vec<GaiaStar>) -> SearchResult<GaiaStar> {
        SearchResult {
            stars,
            ..SearchResult::default()
        }
    }

    fn render(format: TextFormat, headers: TextHeaders, stars: Vec<GaiaStar>) -> String {
        let mut out = Vec::new();
        let criteria = SearchCriteria::new(10.0, -3.0, 0.5).with_source_limit(100);
        write_results(&mut out, format, headers, "Gaia DR3", &criteria, &result(stars)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_full_record() {
        let text = render(TextFormat::Csv, TextHeaders::None, vec![full_star()]);
        assert_eq!(
            text,
            "10.500000000,-3.250000000,1.5000,2.2500,-0.5000,12.125,12.500,11.750,10\n"
        );
    }

    #[test]
    fn test_csv_blanks_missing_values() {
        let mut star = full_star();
        star.flags = flags::LACKING_DATA;
        let text = render(TextFormat::Csv, TextHeaders::None, vec![star]);
        assert_eq!(text, "10.500000000,-3.250000000,,,,12.125,,,7\n");
        assert_eq!(text.trim_end().split(',').count(), 9);
    }

    #[test]
    fn test_csv_headers() {
        let text = render(
            TextFormat::Csv,
            TextHeaders::SearchParametersAndTableColumns,
            Vec::new(),
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_PARAMETER_COLUMNS);
        assert_eq!(
            lines[1],
            "10.000000000,-3.000000000,0.500000000,-1.500,26.000,100,0,0,0"
        );
        assert_eq!(lines[2], CSV_COLUMNS);
    }

    #[test]
    fn test_table_row_widths() {
        let mut partial = full_star();
        partial.flags = flags::NO_GBP_MAG;
        let text = render(TextFormat::Tabular, TextHeaders::TableColumns, vec![full_star(), partial]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        let full = lines[4];
        let missing = lines[5];
        assert_eq!(full.len(), missing.len());
        assert_eq!(full.chars().count(), TABLE_COLUMNS[1].len());
        assert!(full.starts_with(" 10.500000000  -3.250000000     1.5000"));
        assert!(missing.ends_with("00000002"));
    }

    #[test]
    fn test_table_parameter_header() {
        let text = render(TextFormat::Tabular, TextHeaders::SearchParameters, vec![full_star()]);
        assert!(text.starts_with("Gaia DR3 Search\n===============\n"));
        assert!(text.contains("Total sources .............. 1"));
        assert!(text.contains("Source count limit ......... 100"));
    }
}
