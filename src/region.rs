//! Administrative region reference data: district -> neighborhoods.

use std::collections::HashMap;
use std::path::Path;

use crate::input::{column_index, table_reader};
use crate::{Error, Result};

const PROVINCE_COLUMN: &str = "SIDO_NM";
const DISTRICT_COLUMN: &str = "SIGUNGU_NM";
const QUALIFIER_COLUMN: &str = "GU_NM";
const NEIGHBORHOOD_COLUMN: &str = "DONG_NM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct District {
    /// Bare district token matched against result addresses, e.g. `강남구`.
    pub representative_name: String,
    /// Province-qualified label appended to queries, e.g. `서울특별시 강남구`.
    pub full_label: String,
    /// Full neighborhood labels in source order.
    pub neighborhoods: Vec<String>,
}

/// Districts in first-seen order, with a lookup by district name.
#[derive(Debug, Default, Clone)]
pub struct RegionIndex {
    districts: Vec<District>,
    by_name: HashMap<String, usize>,
}

impl RegionIndex {
    /// Loads a CSV/TSV region table. There is no partial index: any bad row fails the load.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = table_reader(path)?;
        let headers = reader.headers().map_err(|e| Error::data_load(path, e))?.clone();
        let province_idx = column_index(&headers, PROVINCE_COLUMN, path)?;
        let district_idx = column_index(&headers, DISTRICT_COLUMN, path)?;
        let qualifier_idx = column_index(&headers, QUALIFIER_COLUMN, path).ok();
        let neighborhood_idx = column_index(&headers, NEIGHBORHOOD_COLUMN, path)?;

        let mut index = RegionIndex::default();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| Error::data_load(path, e))?;
            let cell = |idx: usize| row.get(idx).map(str::trim).unwrap_or_default();

            let (province, district, neighborhood) =
                (cell(province_idx), cell(district_idx), cell(neighborhood_idx));
            if province.is_empty() || district.is_empty() || neighborhood.is_empty() {
                return Err(Error::data_load(
                    path,
                    format!("row {} is missing a province, district or neighborhood", line + 2),
                ));
            }
            let qualifier = qualifier_idx.map(cell).filter(|q| !q.is_empty());
            index.insert(province, district, qualifier, neighborhood);
        }

        if index.is_empty() {
            return Err(Error::data_load(path, "no regions found"));
        }
        Ok(index)
    }

    /// Adds one neighborhood row. `qualifier` is the optional sub-district (`-gu` inside a `-si`).
    pub fn insert(
        &mut self,
        province: &str,
        district: &str,
        qualifier: Option<&str>,
        neighborhood: &str,
    ) {
        let (name, representative) = match qualifier {
            Some(gu) => (format!("{district} {gu}"), gu),
            None => (district.to_string(), district),
        };
        let full_label = format!("{province} {name}");
        let neighborhood = format!("{full_label} {neighborhood}");

        match self.by_name.get(&full_label) {
            Some(&idx) => self.districts[idx].neighborhoods.push(neighborhood),
            None => {
                self.by_name.insert(full_label.clone(), self.districts.len());
                self.districts.push(District {
                    representative_name: representative.to_string(),
                    full_label,
                    neighborhoods: vec![neighborhood],
                });
            }
        }
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    /// Looks a district up by its province-qualified label.
    pub fn get(&self, full_label: &str) -> Option<&District> {
        self.by_name.get(full_label).map(|&idx| &self.districts[idx])
    }

    pub fn len(&self) -> usize {
        self.districts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}
