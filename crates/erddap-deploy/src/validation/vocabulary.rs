//! Controlled vocabularies for dataset metadata.

/// Discrete sampling geometries accepted as `cdm_data_type`.
///
/// See the CF conventions, section "Discrete Sampling Geometries".
pub const CDM_DATA_TYPES: &[&str] = &[
    "Grid",
    "Point",
    "Trajectory",
    "Profile",
    "TimeSeries",
    "TimeSeriesProfile",
    "Other",
];

/// Values accepted as a variable's `ioos_category`.
pub const IOOS_CATEGORIES: &[&str] = &[
    "Bathymetry",
    "Biology",
    "Bottom Character",
    "CO2",
    "Colored Dissolved Organic Matter",
    "Contaminants",
    "Currents",
    "Dissolved Nutrients",
    "Dissolved O2",
    "Ecology",
    "Fish Abundance",
    "Fish Species",
    "Heat Flux",
    "Hydrology",
    "Ice Distribution",
    "Identifier",
    "Location",
    "Meteorology",
    "Ocean Color",
    "Optical Properties",
    "Other",
    "Pathogens",
    "Physical Oceanography",
    "Phytoplankton Species",
    "Pressure",
    "Productivity",
    "Quality",
    "Salinity",
    "Sea Level",
    "Statistics",
    "Stream Flow",
    "Surface Waves",
    "Taxonomy",
    "Temperature",
    "Time",
    "Total Suspended Matter",
    "Unknown",
    "Wind",
    "Zooplankton Species",
    "Zooplankton Abundance",
];

/// Dataset types the server knows how to load.
pub const EDD_TYPES: &[&str] = &[
    "EDDGridAggregateExistingDimension",
    "EDDGridFromAudioFiles",
    "EDDGridFromDap",
    "EDDGridFromEDDTable",
    "EDDGridFromErddap",
    "EDDGridFromEtopo",
    "EDDGridFromMergeIRFiles",
    "EDDGridFromNcFiles",
    "EDDGridFromNcFilesUnpacked",
    "EDDGridFromThreddsCatalog",
    "EDDGridLon0360FromErddapCatalog",
    "EDDGridLonPM180FromErddapCatalog",
    "EDDGridSideBySide",
    "EDDTableFromAsciiFiles",
    "EDDTableFromAudioFiles",
    "EDDTableFromAwsXmlFiles",
    "EDDTableFromBCODMO",
    "EDDTableFromCassandra",
    "EDDTableFromColumnarAsciiFiles",
    "EDDTableFromDapSequence",
    "EDDTableFromDatabase",
    "EDDTableFromEDDGrid",
    "EDDTableFromEML",
    "EDDTableFromEMLBatch",
    "EDDTableFromErddap",
    "EDDTableFromFileNames",
    "EDDTableFromHttpGet",
    "EDDTableFromInPort",
    "EDDTableFromIoosSOS",
    "EDDTableFromJsonlCSVFiles",
    "EDDTableFromMultidimNcFiles",
    "EDDTableFromNcCFFiles",
    "EDDTableFromNcFiles",
    "EDDTableFromNccsvFiles",
    "EDDTableFromOBIS",
    "EDDTableFromSOS",
    "EDDTableFromThreddsFiles",
    "EDDTableFromWFSFiles",
    "EDDsFromFiles",
];

/// Case-insensitive membership in [`CDM_DATA_TYPES`].
pub fn is_cdm_data_type(value: &str) -> bool {
    let value = value.trim();
    CDM_DATA_TYPES.iter().any(|t| t.eq_ignore_ascii_case(value))
}

pub fn is_ioos_category(value: &str) -> bool {
    IOOS_CATEGORIES.contains(&value)
}

pub fn is_edd_type(value: &str) -> bool {
    EDD_TYPES.contains(&value)
}
