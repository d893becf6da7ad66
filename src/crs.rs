/// A coordinate reference system. Only the two CRSes the retiling engine
/// needs by name are represented; this is a value, not process-wide state,
/// so transforms stay hermetic and easy to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326 — geographic WGS84 (longitude, latitude in degrees).
    Wgs84,
    /// EPSG:3857 — spherical Web Mercator (x, y in meters).
    WebMercator,
}

impl Crs {
    #[must_use]
    pub fn epsg_code(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Crs::Wgs84 => "WGS 84",
            Crs::WebMercator => "WGS 84 / Pseudo-Mercator",
        }
    }

    /// Well-known-text definition, as stored in `gpkg_spatial_ref_sys`.
    #[must_use]
    pub fn well_known_text(self) -> &'static str {
        match self {
            Crs::Wgs84 => {
                r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#
            }
            Crs::WebMercator => {
                r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],UNIT["metre",1],AXIS["X",EAST],AXIS["Y",NORTH],AUTHORITY["EPSG","3857"]]"#
            }
        }
    }
}
