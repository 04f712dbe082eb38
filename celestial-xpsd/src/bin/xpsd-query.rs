use anyhow::Context;
use celestial_xpsd::output::{self, TextFormat, TextHeaders};
use celestial_xpsd::{
    CatalogOptions, CatalogSet, GaiaDr2, GaiaDr3, GaiaStar, RecordCodec, SearchCriteria,
    SearchResult, SortBy,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum)]
enum Release {
    Dr2,
    Dr3,
}

impl Release {
    fn title(self) -> &'static str {
        match self {
            Release::Dr2 => "Gaia DR2",
            Release::Dr3 => "Gaia DR3",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum Headers {
    None,
    Params,
    Columns,
    All,
}

impl From<Headers> for TextHeaders {
    fn from(h: Headers) -> Self {
        match h {
            Headers::None => TextHeaders::None,
            Headers::Params => TextHeaders::SearchParameters,
            Headers::Columns => TextHeaders::TableColumns,
            Headers::All => TextHeaders::SearchParametersAndTableColumns,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    None,
    Ra,
    Dec,
    G,
    Bp,
    Rp,
    Parallax,
}

impl From<SortArg> for SortBy {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::None => SortBy::None,
            SortArg::Ra => SortBy::Ra,
            SortArg::Dec => SortBy::Dec,
            SortArg::G => SortBy::G,
            SortArg::Bp => SortBy::Bp,
            SortArg::Rp => SortBy::Rp,
            SortArg::Parallax => SortBy::Parallax,
        }
    }
}

#[derive(Parser)]
#[command(name = "xpsd-query")]
#[command(about = "Query Gaia XPSD point source database files")]
struct Cli {
    /// Path to a database file (repeat for magnitude-sliced sets)
    #[arg(long, required = true)]
    catalog: Vec<PathBuf>,

    /// Gaia data release the files belong to
    #[arg(long, value_enum, default_value = "dr3")]
    release: Release,

    /// Fail on the first unreadable block instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Number of decompressed blocks to keep cached per file
    #[arg(long, default_value = "0")]
    cache: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print database information
    Info,
    /// Perform a circular search
    Search {
        /// Right ascension of the search center in degrees
        ra: f64,
        /// Declination of the search center in degrees
        #[arg(allow_hyphen_values = true)]
        dec: f64,
        /// Search radius in degrees
        #[arg(long, default_value = "1.0")]
        radius: f64,
        /// Brightest magnitude to include
        #[arg(long, default_value = "-1.5", allow_hyphen_values = true)]
        mag_low: f32,
        /// Faintest magnitude to include
        #[arg(long, default_value = "26.0")]
        mag_high: f32,
        /// Maximum number of sources to return
        #[arg(long)]
        limit: Option<usize>,
        /// Flags that must all be set (hex)
        #[arg(long, value_parser = parse_flags)]
        require: Option<u32>,
        /// Flags of which at least one must be set (hex)
        #[arg(long, value_parser = parse_flags)]
        any: Option<u32>,
        /// Flags that must not be set (hex)
        #[arg(long, value_parser = parse_flags)]
        exclude: Option<u32>,
        /// Sort order of the merged result
        #[arg(long, value_enum, default_value = "g")]
        sort: SortArg,
        /// Header blocks printed before table and CSV output
        #[arg(long, value_enum, default_value = "columns")]
        headers: Headers,
        /// Print search statistics
        #[arg(long)]
        timing: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.release {
        Release::Dr2 => run::<GaiaDr2>(&cli),
        Release::Dr3 => run::<GaiaDr3>(&cli),
    }
}

fn run<C: RecordCodec<Record = GaiaStar>>(cli: &Cli) -> anyhow::Result<()> {
    let options = CatalogOptions::default()
        .strict(cli.strict)
        .with_block_cache(cli.cache);
    let set = CatalogSet::<C>::open_with(cli.catalog.as_slice(), options)
        .with_context(|| format!("Cannot open {} database", cli.release.title()))?;

    match &cli.command {
        Commands::Info => {
            for (i, file) in set.files().iter().enumerate() {
                if i > 0 {
                    println!();
                }
                println!("{}", file);
            }
        }
        Commands::Search {
            ra,
            dec,
            radius,
            mag_low,
            mag_high,
            limit,
            require,
            any,
            exclude,
            sort,
            headers,
            timing,
            format,
        } => {
            let mut criteria = SearchCriteria::new(*ra, *dec, *radius)
                .with_magnitude_range(*mag_low, *mag_high)
                .with_inclusion_flags(require.unwrap_or(0))
                .with_any_flags(any.unwrap_or(0))
                .with_exclusion_flags(exclude.unwrap_or(0));
            if let Some(limit) = limit {
                criteria = criteria.with_source_limit(*limit);
            }

            let result = set.search(&criteria, (*sort).into())?;

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            match format {
                OutputFormat::Table => output::write_results(
                    &mut out,
                    TextFormat::Tabular,
                    (*headers).into(),
                    cli.release.title(),
                    &criteria,
                    &result,
                )?,
                OutputFormat::Csv => output::write_results(
                    &mut out,
                    TextFormat::Csv,
                    (*headers).into(),
                    cli.release.title(),
                    &criteria,
                    &result,
                )?,
                OutputFormat::Json => print_json(&mut out, &result)?,
            }
            out.flush()?;

            if *timing {
                print_summary(&result);
            }
        }
    }

    Ok(())
}

fn print_summary(result: &SearchResult<GaiaStar>) {
    eprintln!("Sources .................... {}", result.stars.len());
    eprintln!("Excess sources ............. {}", result.excess_count);
    eprintln!("Rejected sources ........... {}", result.reject_count);
    eprintln!("Unreadable blocks .......... {}", result.block_errors.len());
    eprintln!("{}", result.stats);
    for err in &result.block_errors {
        eprintln!("  {}", err);
    }
}

#[derive(serde::Serialize)]
struct JsonStar {
    ra: f64,
    dec: f64,
    parallax: Option<f32>,
    pmra: Option<f32>,
    pmdec: Option<f32>,
    mag_g: f32,
    mag_bp: Option<f32>,
    mag_rp: Option<f32>,
    flags: u32,
}

impl From<&GaiaStar> for JsonStar {
    fn from(s: &GaiaStar) -> Self {
        let motion = s.has_proper_motion();
        JsonStar {
            ra: s.ra,
            dec: s.dec,
            parallax: motion.then_some(s.parallax),
            pmra: motion.then_some(s.pmra),
            pmdec: motion.then_some(s.pmdec),
            mag_g: s.mag_g,
            mag_bp: s.has_bp().then_some(s.mag_bp),
            mag_rp: s.has_rp().then_some(s.mag_rp),
            flags: s.flags,
        }
    }
}

fn print_json<W: Write>(out: &mut W, result: &SearchResult<GaiaStar>) -> anyhow::Result<()> {
    let stars: Vec<JsonStar> = result.stars.iter().map(JsonStar::from).collect();
    serde_json::to_writer_pretty(&mut *out, &stars)?;
    writeln!(out)?;
    Ok(())
}

fn parse_flags(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex flags '{}': {}", s, e))
}
