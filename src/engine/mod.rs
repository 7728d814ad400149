//! The feature-propagation engine.
//!
//! [`FeatureEngine`] drives the whole pipeline: fit enumerates candidate
//! features over the schema tree, fits child engines for joined subtrees,
//! scores every candidate by R² on a deterministic sample and keeps the
//! best; transform shards the population across worker threads and
//! materializes the numeric feature matrix.
//!
//! # Submodules
//! - `feature` — abstract features, aggregation kinds, conditions
//! - `matches` — match enumeration per join edge
//! - `conditions` — compiled match predicates
//! - `state` — incremental aggregation state machines
//! - `kernels` — one-shot time-based kernels
//! - `enumerate` — candidate enumeration
//! - `select` — R² scoring and top-N selection
//! - `table_holder` — per-edge resolved table pairs
//! - `subfeatures` — recursive child-engine composition
//! - `builder` — per-row evaluation
//! - `driver` — thread sharding and progress
//! - `matrix` — heap- or mmap-backed output storage

pub mod builder;
pub mod conditions;
pub mod driver;
pub mod enumerate;
pub mod feature;
pub mod kernels;
pub mod matches;
pub mod matrix;
pub mod select;
pub mod state;
pub mod subfeatures;
pub mod table_holder;

pub use feature::{AbstractFeature, AggKind, Condition, DataUsed};
pub use matrix::FeatureMatrix;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Hyperparameters;
use crate::engine::builder::BuildContext;
use crate::engine::driver::DriveParams;
use crate::engine::subfeatures::SubfeatureOutput;
use crate::engine::table_holder::TableHolder;
use crate::error::{RelPropError, Result};
use crate::frame::{ColumnDescription, DataFrame, DataFrameView, TableSchema, TableSide};
use crate::placeholder::SchemaTree;

/// Caller-side knobs of one fit or transform run.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Back feature matrices with memory-mapped temp files in this
    /// directory instead of the heap.
    pub temp_dir: Option<PathBuf>,
    /// Cooperative cancel flag, checked at row-loop boundaries and between
    /// scoring batches.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(std::sync::atomic::Ordering::Relaxed))
    }
}

/// Everything fit produces; persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    /// The selected abstract features (all candidates for a child engine).
    features: Vec<AbstractFeature>,
    population_schema: TableSchema,
    peripheral_schemas: Vec<TableSchema>,
    /// Per-edge peripheral-side schemas, including lagged-target columns.
    edge_peripheral_schemas: Vec<TableSchema>,
    /// One child engine per join edge whose subtree has its own joins.
    subengines: Vec<Option<FeatureEngine>>,
}

/// The automated relational feature engineering engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngine {
    hyperparameters: Hyperparameters,
    peripheral_names: Vec<String>,
    tree: SchemaTree,
    fitted: Option<Fitted>,
}

impl FeatureEngine {
    /// Create an unfitted engine over a schema tree.
    pub fn new(
        hyperparameters: Hyperparameters,
        peripheral_names: Vec<String>,
        tree: SchemaTree,
    ) -> Result<Self> {
        hyperparameters.validate()?;
        tree.check(&peripheral_names)?;
        Ok(Self {
            hyperparameters,
            peripheral_names,
            tree,
            fitted: None,
        })
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn peripheral_names(&self) -> &[String] {
        &self.peripheral_names
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Number of features the engine produces (0 before fit).
    pub fn num_features(&self) -> usize {
        self.fitted.as_ref().map(|f| f.features.len()).unwrap_or(0)
    }

    /// The selected abstract features.
    pub fn features(&self) -> Result<&[AbstractFeature]> {
        Ok(&self.require_fitted("features")?.features)
    }

    /// The population schema extracted at fit time.
    pub fn population_schema(&self) -> Result<&TableSchema> {
        Ok(&self.require_fitted("population_schema")?.population_schema)
    }

    /// The peripheral schemas extracted at fit time.
    pub fn peripheral_schemas(&self) -> Result<&[TableSchema]> {
        Ok(&self.require_fitted("peripheral_schemas")?.peripheral_schemas)
    }

    pub(crate) fn edge_peripheral_schemas(&self) -> Result<&[TableSchema]> {
        Ok(&self
            .require_fitted("edge_peripheral_schemas")?
            .edge_peripheral_schemas)
    }

    pub(crate) fn subengines(&self) -> Result<&[Option<FeatureEngine>]> {
        Ok(&self.require_fitted("subengines")?.subengines)
    }

    fn require_fitted(&self, what: &str) -> Result<&Fitted> {
        self.fitted
            .as_ref()
            .ok_or_else(|| RelPropError::NotFitted(what.to_string()))
    }

    // ── Fit ──────────────────────────────────────────────────────────────

    /// Fit the engine: enumerate, score and select features.
    pub fn fit(&mut self, population: &Arc<DataFrame>, peripherals: &[Arc<DataFrame>]) -> Result<()> {
        self.fit_with(population, peripherals, &RunOptions::default())
    }

    pub fn fit_with(
        &mut self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
    ) -> Result<()> {
        self.fit_impl(population, peripherals, opts, false)
    }

    fn fit_impl(
        &mut self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
        as_subfeatures: bool,
    ) -> Result<()> {
        self.hyperparameters.validate()?;
        self.tree.check(&self.peripheral_names)?;
        self.check_peripheral_count(peripherals)?;
        if population.nrows() == 0 {
            return Err(RelPropError::EmptyPopulation);
        }

        let population_schema = population.to_schema();
        let peripheral_schemas: Vec<TableSchema> =
            peripherals.iter().map(|df| df.to_schema()).collect();

        let view = DataFrameView::whole(Arc::clone(population));
        let holder = TableHolder::new(&self.tree, view, peripherals, &self.peripheral_names)?;

        let edge_peripheral_schemas: Vec<TableSchema> = holder
            .pairs
            .iter()
            .map(|pair| pair.peripheral.to_schema())
            .collect();

        let subengines = self.fit_subengines(&holder, peripherals, opts)?;

        let subfeature_counts: Vec<usize> = subengines
            .iter()
            .map(|sub| sub.as_ref().map(FeatureEngine::num_features).unwrap_or(0))
            .collect();

        let candidates = enumerate::enumerate(&self.hyperparameters, &holder, &subfeature_counts);

        if !as_subfeatures {
            info!(candidates = candidates.len(), "trying candidate features");
        }

        self.fitted = Some(Fitted {
            features: candidates,
            population_schema,
            peripheral_schemas,
            edge_peripheral_schemas,
            subengines,
        });

        // A child engine keeps every candidate; the parent's selection
        // decides which of its columns are ever built.
        if !as_subfeatures {
            self.select_features(population, peripherals, opts)?;
        }

        Ok(())
    }

    fn fit_subengines(
        &self,
        holder: &TableHolder,
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
    ) -> Result<Vec<Option<FeatureEngine>>> {
        let root = self.tree.node(self.tree.root());
        let mut subengines = Vec::with_capacity(root.children.len());

        for (edge, pair) in root.children.iter().zip(holder.pairs.iter()) {
            if self.tree.node(edge.child).children.is_empty() {
                subengines.push(None);
                continue;
            }

            let mut child = FeatureEngine::new(
                self.hyperparameters.clone(),
                self.peripheral_names.clone(),
                self.tree.subtree(edge.child),
            )?;
            child.fit_impl(&peripherals[pair.peripheral_ix], peripherals, opts, true)?;
            subengines.push(Some(child));
        }

        Ok(subengines)
    }

    /// Score every candidate on the deterministic sample and keep the top
    /// `num_features`.
    fn select_features(
        &mut self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
    ) -> Result<()> {
        let num_candidates = self.num_features();
        let num_features = self.hyperparameters.num_features;

        if num_candidates <= num_features {
            info!(progress_pct = 100, "trained features");
            return Ok(());
        }

        let sample = Arc::new(select::sample_rows(
            population.nrows(),
            self.hyperparameters.sampling_factor,
        ));
        let targets: Vec<&[f64]> = population
            .targets()
            .iter()
            .map(|col| col.as_slice())
            .collect();

        let mut scores = Vec::with_capacity(num_candidates);
        let mut begin = 0;
        while begin < num_candidates {
            if opts.cancelled() {
                return Err(RelPropError::Cancelled);
            }

            let end = (begin + select::SCORING_BATCH_SIZE).min(num_candidates);
            let index: Vec<usize> = (begin..end).collect();

            let matrix =
                self.transform_index(population, peripherals, &index, Some(&sample), opts, false)?;
            scores.extend(select::score_batch(&matrix, &targets, &sample));

            info!(
                built = end,
                progress_pct = (end * 100) / num_candidates,
                "scored candidate features"
            );
            begin = end;
        }

        let keep = select::select_top(&scores, num_features);
        let fitted = self
            .fitted
            .as_mut()
            .ok_or_else(|| RelPropError::Internal("selection before enumeration".to_string()))?;
        fitted.features = keep.iter().map(|&ix| fitted.features[ix].clone()).collect();

        Ok(())
    }

    // ── Transform ────────────────────────────────────────────────────────

    /// Build the feature matrix for the selected features: one row per
    /// population row, one column per feature.
    pub fn transform(
        &self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
    ) -> Result<FeatureMatrix> {
        self.transform_with(population, peripherals, &RunOptions::default())
    }

    pub fn transform_with(
        &self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
    ) -> Result<FeatureMatrix> {
        let index: Vec<usize> = (0..self.features()?.len()).collect();
        info!(features = index.len(), "building features");
        self.transform_index(population, peripherals, &index, None, opts, true)
    }

    /// Build a subset of features, optionally over a row subset. Matrix row
    /// `i` corresponds to `rownums[i]` (or population row `i` without a
    /// subset); column `j` to `index[j]`.
    fn transform_index(
        &self,
        population: &Arc<DataFrame>,
        peripherals: &[Arc<DataFrame>],
        index: &[usize],
        rownums: Option<&Arc<Vec<usize>>>,
        opts: &RunOptions,
        log_progress: bool,
    ) -> Result<FeatureMatrix> {
        let fitted = self.require_fitted("transform")?;
        self.check_peripheral_count(peripherals)?;
        if population.nrows() == 0 {
            return Err(RelPropError::EmptyPopulation);
        }

        let view = match rownums {
            Some(rows) => DataFrameView::with_rows(Arc::clone(population), Arc::clone(rows)),
            None => DataFrameView::whole(Arc::clone(population)),
        };

        let holder = TableHolder::new(&self.tree, view.clone(), peripherals, &self.peripheral_names)?;

        let subs = self.build_subfeatures(fitted, &holder, index, peripherals, opts)?;

        let ctx = BuildContext {
            pairs: &holder.pairs,
            features: &fitted.features,
            index,
            subfeatures: &subs,
            cancel: opts.cancel.as_deref(),
        };

        driver::drive(DriveParams {
            ctx: &ctx,
            nrows: view.nrows(),
            num_threads: self.hyperparameters.effective_num_threads(),
            temp_dir: opts.temp_dir.as_deref(),
            log_progress,
        })
    }

    /// Run every referenced child engine once, restricted to the reachable
    /// peripheral rows.
    fn build_subfeatures(
        &self,
        fitted: &Fitted,
        holder: &TableHolder,
        index: &[usize],
        peripherals: &[Arc<DataFrame>],
        opts: &RunOptions,
    ) -> Result<Vec<Option<SubfeatureOutput>>> {
        let mut outputs = Vec::with_capacity(holder.pairs.len());

        for (i, pair) in holder.pairs.iter().enumerate() {
            let Some(Some(subengine)) = fitted.subengines.get(i) else {
                outputs.push(None);
                continue;
            };

            let sub_index = subfeatures::subfeature_index(&fitted.features, index, i);
            if sub_index.is_empty() {
                outputs.push(None);
                continue;
            }

            info!(edge = i, columns = sub_index.len(), "building subfeatures");

            let rows = subfeatures::reachable_rows(pair, pair.population.nrows());
            if rows.is_empty() {
                outputs.push(None);
                continue;
            }
            let rows = Arc::new(rows);

            let matrix = subengine.transform_index(
                &peripherals[pair.peripheral_ix],
                peripherals,
                &sub_index,
                Some(&rows),
                opts,
                false,
            )?;

            outputs.push(Some(SubfeatureOutput {
                rownums: rows,
                col_pos: subfeatures::col_positions(&sub_index, subengine.num_features()),
                matrix,
            }));
        }

        Ok(outputs)
    }

    fn check_peripheral_count(&self, peripherals: &[Arc<DataFrame>]) -> Result<()> {
        if peripherals.len() < self.peripheral_names.len() {
            return Err(RelPropError::PeripheralCountMismatch {
                expected: self.peripheral_names.len(),
                got: peripherals.len(),
            });
        }
        Ok(())
    }

    // ── Column importances ───────────────────────────────────────────────

    /// Distribute per-feature importance factors over the columns each
    /// feature reads. Same-unit features split their credit evenly between
    /// the two referenced columns; subfeature credit descends into the
    /// child engine, whose population-side columns surface as peripheral
    /// columns of this engine.
    pub fn column_importances(
        &self,
        importance_factors: &[f64],
    ) -> Result<BTreeMap<ColumnDescription, f64>> {
        let fitted = self.require_fitted("column_importances")?;
        if importance_factors.len() != fitted.features.len() {
            return Err(RelPropError::InvalidHyperparameters(format!(
                "expected {} importance factors, got {}",
                fitted.features.len(),
                importance_factors.len()
            )));
        }

        let mut importances: BTreeMap<ColumnDescription, f64> = BTreeMap::new();
        let mut subfactors: Vec<Vec<f64>> = fitted
            .subengines
            .iter()
            .map(|sub| vec![0.0; sub.as_ref().map(FeatureEngine::num_features).unwrap_or(0)])
            .collect();

        for (feature, &factor) in fitted.features.iter().zip(importance_factors) {
            self.infer_importance(fitted, feature, factor, &mut subfactors, &mut importances);
        }

        for (i, sub) in fitted.subengines.iter().enumerate() {
            let Some(subengine) = sub else { continue };
            for (desc, value) in subengine.column_importances(&subfactors[i])? {
                // The child's population is this engine's peripheral.
                let desc = match desc.side {
                    TableSide::Population => ColumnDescription::peripheral(desc.table, desc.column),
                    TableSide::Peripheral => desc,
                };
                *importances.entry(desc).or_insert(0.0) += value;
            }
        }

        Ok(importances)
    }

    fn infer_importance(
        &self,
        fitted: &Fitted,
        feature: &AbstractFeature,
        factor: f64,
        subfactors: &mut [Vec<f64>],
        importances: &mut BTreeMap<ColumnDescription, f64>,
    ) {
        let peripheral = &fitted.edge_peripheral_schemas[feature.peripheral];
        let population = &fitted.population_schema;

        let mut add = |desc: ColumnDescription, value: f64| {
            *importances.entry(desc).or_insert(0.0) += value;
        };

        match feature.data_used {
            DataUsed::Categorical => add(
                ColumnDescription::peripheral(
                    &peripheral.name,
                    &peripheral.categoricals[feature.input_col].name,
                ),
                factor,
            ),
            DataUsed::Discrete => add(
                ColumnDescription::peripheral(
                    &peripheral.name,
                    &peripheral.discretes[feature.input_col].name,
                ),
                factor,
            ),
            DataUsed::Numerical => add(
                ColumnDescription::peripheral(
                    &peripheral.name,
                    &peripheral.numericals[feature.input_col].name,
                ),
                factor,
            ),
            DataUsed::SameUnitsCategorical => {
                let out_col = feature.output_col.unwrap_or(0);
                add(
                    ColumnDescription::peripheral(
                        &peripheral.name,
                        &peripheral.categoricals[feature.input_col].name,
                    ),
                    factor * 0.5,
                );
                add(
                    ColumnDescription::population(
                        &population.name,
                        &population.categoricals[out_col].name,
                    ),
                    factor * 0.5,
                );
            }
            DataUsed::SameUnitsDiscrete | DataUsed::SameUnitsDiscreteTs => {
                let out_col = feature.output_col.unwrap_or(0);
                add(
                    ColumnDescription::peripheral(
                        &peripheral.name,
                        &peripheral.discretes[feature.input_col].name,
                    ),
                    factor * 0.5,
                );
                add(
                    ColumnDescription::population(
                        &population.name,
                        &population.discretes[out_col].name,
                    ),
                    factor * 0.5,
                );
            }
            DataUsed::SameUnitsNumerical | DataUsed::SameUnitsNumericalTs => {
                let out_col = feature.output_col.unwrap_or(0);
                add(
                    ColumnDescription::peripheral(
                        &peripheral.name,
                        &peripheral.numericals[feature.input_col].name,
                    ),
                    factor * 0.5,
                );
                add(
                    ColumnDescription::population(
                        &population.name,
                        &population.numericals[out_col].name,
                    ),
                    factor * 0.5,
                );
            }
            DataUsed::Subfeatures => {
                if let Some(factors) = subfactors.get_mut(feature.peripheral)
                    && feature.input_col < factors.len()
                {
                    factors[feature.input_col] += factor;
                }
            }
            DataUsed::NotApplicable => {}
        }
    }
}
