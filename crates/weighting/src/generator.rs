//! Weight-file generation for one cycle's fresh rows

use fit_core::{
    Cycle, Error, LabeledValue, Result, RowTag, WeightMethod, WeightingConfig,
};
use row_store::RowFile;
use tracing::{info, instrument};

use crate::engine::product;

const TAGS: [RowTag; 5] = [
    RowTag::Force,
    RowTag::ForceGas,
    RowTag::Energy,
    RowTag::EnergyGas,
    RowTag::Stress,
];

type Terms = Vec<(WeightMethod, Vec<f64>)>;

/// Writes per-row weights from a labeled-b file and its natoms companion
#[derive(Debug, Clone)]
pub struct WeightEngine {
    /// Validated terms, one entry per tag in `TAGS` order
    terms: [Terms; 5],
}

impl WeightEngine {
    /// Resolve every tag's request up front; a bad request fails here,
    /// before any weight is written.
    pub fn new(config: &WeightingConfig) -> Result<Self> {
        let mut terms: [Terms; 5] = Default::default();
        for tag in TAGS {
            terms[slot(tag)] = config.request_for(tag).terms()?;
        }
        Ok(Self { terms })
    }

    /// Weight of one row
    pub fn weight(&self, tag: RowTag, cycle: Cycle, value: f64, natoms: u32) -> f64 {
        product(&self.terms[slot(tag)], cycle, value, natoms)
    }

    /// Stream `labeled_b` and `natoms` in lock-step and write one weight per
    /// row to `out`, returning the number of rows written.
    #[instrument(skip_all, fields(cycle = cycle, out = %out.path().display()))]
    pub async fn write_weights(
        &self,
        labeled_b: &RowFile,
        natoms: &RowFile,
        out: &RowFile,
        cycle: Cycle,
    ) -> Result<u64> {
        let mut labels = labeled_b.reader().await?;
        let mut atoms = natoms.reader().await?;
        let mut writer = out.create().await?;

        loop {
            let (label, count) = match (labels.next_line().await?, atoms.next_line().await?) {
                (Some(label), Some(count)) => (label, count),
                (None, None) => break,
                _ => {
                    return Err(Error::RowCountMismatch {
                        path: natoms.path().to_path_buf(),
                        expected: labeled_b.line_count().await?,
                        actual: natoms.line_count().await?,
                    })
                }
            };

            let row = LabeledValue::parse(&label)
                .map_err(|reason| Error::malformed(labeled_b.path(), labels.lines_read(), reason))?;
            let n = parse_natoms(&count)
                .map_err(|reason| Error::malformed(natoms.path(), atoms.lines_read(), reason))?;

            let weight = self.weight(row.tag, cycle, row.value, n);
            writer.write_line(&format!("{:?}", weight)).await?;
        }

        let rows = writer.finish().await?;
        info!(rows, "Weights written");
        Ok(rows)
    }
}

fn slot(tag: RowTag) -> usize {
    match tag {
        RowTag::Force => 0,
        RowTag::ForceGas => 1,
        RowTag::Energy => 2,
        RowTag::EnergyGas => 3,
        RowTag::Stress => 4,
    }
}

fn parse_natoms(line: &str) -> std::result::Result<u32, String> {
    let token = line.trim();
    let n = token
        .parse::<u32>()
        .map_err(|e| format!("bad atom count {:?}: {}", token, e))?;
    if n == 0 {
        return Err("atom count must be at least 1".to_string());
    }
    Ok(n)
}
