//! CLI entry point: speciate a single pollutant/mass pair against the
//! SPECIATE tables and print the expanded emissions.
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use error_stack::ResultExt;
use thiserror::Error;

use emis_rs::emissions::{EmissionsContainer, Pollutant};
use emis_rs::logging::init_logging;
use emis_rs::record::{PolygonWithoutEcon, Record, RecordOps};
use emis_rs::source::{SourceData, SourceType};
use emis_rs::speciation::db::{ProfileTable, SpeciesTable};
use emis_rs::speciation::mechanism::MechanismTable;
use emis_rs::speciation::reference::SpeciationReference;
use emis_rs::speciation::speciator::{Speciator, SpeciationTables};
use emis_rs::units::{Period, Quantity};

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load SPECIATE tables")]
    LoadTables,
    #[error("failed to load speciation reference")]
    LoadReference,
    #[error("failed to load chemical mechanism")]
    LoadMechanism,
    #[error("speciation failed")]
    Speciate,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Speciate one lumped pollutant total against the SPECIATE tables")]
struct Args {
    /// SPECIES_PROPERTIES CSV export (ID, NAME, SPEC_MW).
    #[arg(long)]
    species: PathBuf,
    /// GAS_PROFILE CSV export (P_NUMBER, VOCtoTOG).
    #[arg(long)]
    gas_profile: PathBuf,
    /// GAS_SPECIES CSV export (P_NUMBER, SPECIES_ID, WEIGHT_PER) for VOC profiles.
    #[arg(long)]
    gas_species: PathBuf,
    /// OTHER_GAS_SPECIES CSV export, same columns as gas-species, for NOx profiles.
    #[arg(long)]
    other_gas_species: PathBuf,
    /// PM_SPECIES CSV export, same columns as gas-species, for PM2.5 profiles.
    #[arg(long)]
    pm_species: PathBuf,
    /// Reference CSV (scc, pollutant, code).
    #[arg(long)]
    reference: PathBuf,
    /// Optional combo fraction CSV (period, pollutant, fips, code, fraction).
    #[arg(long)]
    combo: Option<PathBuf>,
    /// Mechanism group-factor CSV (species_id, group, factor, group_mw).
    #[arg(long)]
    mechanism_file: PathBuf,
    /// Mechanism name these factors belong to (e.g. SAPRC99).
    #[arg(long)]
    mechanism: String,

    #[arg(long)]
    scc: String,
    #[arg(long, default_value = "37183")]
    fips: String,
    #[arg(long)]
    pollutant: String,
    #[arg(long)]
    mass_kg: f64,
    /// Calendar year the annual total applies to, for converting it to a rate.
    #[arg(long, default_value_t = 2016)]
    year: i32,
    #[arg(long, default_value_t = true)]
    mass_basis: bool,

    #[command(flatten)]
    verbosity: Verbosity<clap_verbosity_flag::InfoLevel>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbosity.log_level_filter());

    match driver(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn driver(args: Args) -> error_stack::Result<(), CliError> {
    let species = SpeciesTable::load(&args.species).change_context(CliError::LoadTables)?;
    let voc_profiles = ProfileTable::load_voc(&args.gas_profile, &args.gas_species).change_context(CliError::LoadTables)?;
    let other_gas_profiles = ProfileTable::load_simple(&args.other_gas_species).change_context(CliError::LoadTables)?;
    let pm_profiles = ProfileTable::load_simple(&args.pm_species).change_context(CliError::LoadTables)?;

    let mut reference = SpeciationReference::load(&args.reference).change_context(CliError::LoadReference)?;
    if let Some(combo) = &args.combo {
        reference.load_combo(combo).change_context(CliError::LoadReference)?;
    }

    let mut mechanism = MechanismTable::new();
    mechanism.load(&args.mechanism, &args.mechanism_file).change_context(CliError::LoadMechanism)?;

    let tables = SpeciationTables { reference: &reference, voc_profiles: &voc_profiles, other_gas_profiles: &other_gas_profiles, pm_profiles: &pm_profiles, species: &species, mechanism: &mechanism };

    let speciator = Speciator {
        tables,
        mechanism_name: &args.mechanism,
        mass_basis: args.mass_basis,
        single_species_names: HashSet::new(),
        equivalent_ids: &|_| vec![],
    };

    let mut emissions = EmissionsContainer::new(args.year);
    let (begin, end) = Period::Annual.time_interval(args.year);
    let seconds = (end - begin).num_seconds() as f64;
    emissions.add(Period::Annual, Pollutant::parse(&args.pollutant), Quantity::rate_kg_per_s(args.mass_kg / seconds));
    let record = Record::PolygonWithoutEcon(PolygonWithoutEcon { source: SourceData::new(&args.fips, &args.scc, SourceType::Area, "US"), emissions });

    let result = speciator.speciate(&record, &args.fips).change_context(CliError::Speciate)?;

    log::info!("speciated {} into {} species groups", args.pollutant, result.emissions.all_pollutants().len());
    for pollutant in result.emissions.all_pollutants() {
        if let Some(total) = result.emissions.totals(pollutant) {
            println!("{pollutant}\t{:.6} kg", total.value);
        }
    }
    for pollutant in result.dropped.all_pollutants() {
        if let Some(total) = result.dropped.totals(pollutant) {
            println!("# dropped (double-counted): {pollutant}\t{:.6} kg", total.value);
        }
    }

    Ok(())
}
