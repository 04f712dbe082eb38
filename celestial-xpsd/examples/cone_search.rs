use celestial_xpsd::{CatalogFile, GaiaDr3, SearchCriteria, SortBy, XpsdResult};

fn main() -> XpsdResult<()> {
    let path = std::env::args()
        .nth(1)
        .expect("Usage: cone_search <gaia-dr3.xpsd>");

    let catalog = CatalogFile::<GaiaDr3>::open(&path)?;
    println!("{}", catalog);

    let criteria = SearchCriteria::new(83.633, -5.375, 0.5)
        .with_magnitude_range(-1.5, 10.0)
        .with_source_limit(20);

    let mut result = catalog.search(&criteria)?;
    result.sort_by(SortBy::G);
    println!(
        "\n{} stars within {:.1}° of ({:.3}, {:.3}), {} more beyond the limit:\n",
        result.len(),
        criteria.radius,
        criteria.center_ra,
        criteria.center_dec,
        result.excess_count,
    );

    for star in &result.stars {
        println!(
            "  RA {:.6}°  Dec {:+.6}°  G {:.3}  flags {:08x}",
            star.ra, star.dec, star.mag_g, star.flags,
        );
    }
    println!("\n{}", result.stats);

    Ok(())
}
