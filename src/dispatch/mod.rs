// In: src/dispatch/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Training Dispatcher
// ====================================================================================
//
// One `train` call is one synchronous pass:
//
//   1. [Config]          validate fractions, overrides and grid shape
//   2. [Table Adapter]   resolve the train (and test) input into canonical tables
//   3. [Planning]        one ColumnType per train column; the target's type
//                        decides the Task and the comparison metric
//   4. [Bridge]          export train (and test) under a fresh ExportLedger
//   5. [Engine]          one TrainingEngine::train call with the exported tables
//                        and the grid (or the autogrid options)
//   6. [Selection]       rank candidates by the comparison metric, keep the
//                        winner as a ModelHandle and the rest as summaries
//
// The exported tables move into the engine. Whatever the engine does with them,
// every export is released by the time `train` returns.
// ====================================================================================

pub mod selection;

use std::sync::Arc;
use std::time::Instant;

use crate::bridge::{export_table, plan_columns, ColumnPlan, ExportLedger, ExportedTable};
use crate::config::TrainingConfig;
use crate::engine::{CandidateOutcome, TrainRequest, TrainingEngine};
use crate::error::TabulaError;
use crate::model::{CandidateSummary, FeatureSchema, ModelHandle, ModelSchema};
use crate::table::{resolve_tables, Table, TableInput};
use crate::telemetry::{EventSink, LogSink};
use crate::types::{ColumnType, Task};

pub use selection::select_best;

/// Drives one training call per `train` against a `TrainingEngine`.
#[derive(Debug)]
pub struct Dispatcher<E: TrainingEngine> {
    engine: E,
    sink: Arc<dyn EventSink>,
}

impl<E: TrainingEngine> Dispatcher<E> {
    /// A dispatcher whose models report telemetry through the `log` facade.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            sink: Arc::new(LogSink),
        }
    }

    /// Replaces the telemetry sink handed to every trained model.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Trains every grid candidate on `train` and returns the best one.
    ///
    /// `test`, when given, must carry every train column and is used as the
    /// test set instead of a split of `train`.
    pub fn train(
        &self,
        train: &TableInput,
        test: Option<&TableInput>,
        target: &str,
        config: &TrainingConfig,
    ) -> Result<ModelHandle, TabulaError> {
        let start = Instant::now();
        config.validate()?;

        let (train_table, test_table) = resolve_tables(train, test)?;

        let plan = plan_columns(&train_table, &config.column_types)?;
        let target_type = target_type(&plan, target)?;
        let task = Task::for_target(target, &target_type)?;
        let comparison_metric = config.resolve_comparison_metric(task)?;
        log::info!(
            "Training '{}' as a {} task on {} rows, comparing candidates on {}",
            target,
            task,
            train_table.row_count(),
            comparison_metric.name()
        );

        let ledger = ExportLedger::new();
        let (exported_train, exported_test) =
            export_inputs(&train_table, test_table.as_ref(), &plan, target, &ledger)?;
        log::debug!(
            "Exported {} feature column(s) across {} table(s)",
            exported_train.features.len(),
            1 + exported_test.is_some() as usize
        );

        let request = TrainRequest {
            train: exported_train,
            test: exported_test,
            task,
            grid: config.grid_spec(),
            comparison_metric,
            shuffle: config.shuffle,
            test_fraction: config.test_fraction,
            comparison_fraction: config.comparison_fraction,
        };
        let outcomes = self.engine.train(request);
        if !ledger.is_balanced() {
            log::warn!(
                "{} exported column(s) still outstanding after the engine returned",
                ledger.outstanding()
            );
        }
        let mut outcomes = outcomes?;
        if outcomes.is_empty() {
            return Err(TabulaError::EngineFailure(
                "engine returned no candidates".to_string(),
            ));
        }

        // Score and select.
        let scores: Vec<f32> = outcomes
            .iter()
            .map(|o| o.comparison_metrics.score(comparison_metric).unwrap_or(f32::NAN))
            .collect();
        let best = select_best(&scores, comparison_metric.direction()).unwrap_or(0);
        log_scoreboard(&outcomes, &scores, best, comparison_metric.name());

        let candidates = outcomes
            .iter()
            .zip(&scores)
            .enumerate()
            .map(|(position, (outcome, &score))| CandidateSummary {
                grid_index: outcome.grid_index,
                family: outcome.family,
                comparison_metric,
                comparison_score: (!score.is_nan()).then_some(score),
                selected: position == best,
            })
            .collect();

        let winner = outcomes.swap_remove(best);
        let schema = ModelSchema {
            target: target.to_string(),
            target_type,
            task,
            features: feature_schema(&plan, target),
        };
        let handle = ModelHandle::new(
            schema,
            winner.model,
            winner.test_metrics,
            candidates,
            self.sink.clone(),
        );
        log::info!(
            "Selected candidate {} ({:?}) as model {} in {:.2?}",
            winner.grid_index,
            winner.family,
            handle.id(),
            start.elapsed()
        );
        Ok(handle)
    }
}

/// Exports train, then test. If the test export fails, the train columns are
/// dropped (and released) before the error is returned.
fn export_inputs(
    train: &Table,
    test: Option<&Table>,
    plan: &[ColumnPlan],
    target: &str,
    ledger: &ExportLedger,
) -> Result<(ExportedTable, Option<ExportedTable>), TabulaError> {
    let exported_train = export_table(train, plan, target, ledger)?;
    let exported_test = match test {
        Some(table) => match export_table(table, plan, target, ledger) {
            Ok(exported) => Some(exported),
            Err(e) => {
                drop(exported_train);
                log::debug!(
                    "Test export failed, {} export(s) outstanding after releasing train",
                    ledger.outstanding()
                );
                return Err(e);
            }
        },
        None => None,
    };
    Ok((exported_train, exported_test))
}

fn target_type(plan: &[ColumnPlan], target: &str) -> Result<ColumnType, TabulaError> {
    let column_plan = plan
        .iter()
        .find(|p| p.name == target)
        .ok_or_else(|| TabulaError::MissingTargetColumn(target.to_string()))?;
    column_plan.column_type.clone().ok_or_else(|| {
        TabulaError::InvalidConfig(format!(
            "target column '{target}' has no logical column type"
        ))
    })
}

fn feature_schema(plan: &[ColumnPlan], target: &str) -> Vec<FeatureSchema> {
    plan.iter()
        .filter(|p| p.name != target)
        .filter_map(|p| {
            p.column_type.as_ref().map(|column_type| FeatureSchema {
                name: p.name.clone(),
                column_type: column_type.clone(),
                data_type: column_type.physical_type(),
            })
        })
        .collect()
}

fn log_scoreboard(outcomes: &[CandidateOutcome], scores: &[f32], best: usize, metric: &str) {
    log::info!("--- CANDIDATE SCOREBOARD ({metric} on the comparison split) ---");
    for (position, (outcome, score)) in outcomes.iter().zip(scores).enumerate() {
        log::info!(
            "  {} #{:<3} {:<8} | {}: {:.5}",
            if position == best { "*" } else { " " },
            outcome.grid_index,
            format!("{:?}", outcome.family),
            metric,
            score
        );
    }
}

#[cfg(test)]
mod tests;
