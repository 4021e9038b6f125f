use super::*;
use crate::config::{ColumnTypeOverride, ComparisonMetric, GridItem, LinearGridItem, ModelFamily};
use crate::engine::{EngineError, FeatureValue, RawPrediction, ReferenceEngine, TrainedModel};
use crate::metrics::{BinaryClassificationMetrics, Metrics};
use crate::model::predict::{PredictInput, PredictOptions, PredictOutput};
use crate::table::RecordFrame;
use crate::telemetry::{MemorySink, TelemetryEvent};
use serde_json::json;
use std::sync::Mutex;

#[derive(Debug)]
struct ConstantModel(f32);

impl TrainedModel for ConstantModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Tree
    }

    fn predict(&self, _row: &[FeatureValue], _contributions: bool) -> Result<RawPrediction, EngineError> {
        Ok(RawPrediction::Classification {
            probabilities: vec![1.0 - self.0, self.0],
            contributions: None,
        })
    }
}

/// Reports one candidate per score, with that score as its AUC. Records the
/// feature names it was handed.
#[derive(Debug, Default)]
struct ScriptedEngine {
    aucs: Vec<f32>,
    seen_features: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn new(aucs: &[f32]) -> Self {
        Self {
            aucs: aucs.to_vec(),
            ..Default::default()
        }
    }
}

impl TrainingEngine for ScriptedEngine {
    fn train(&self, request: TrainRequest) -> Result<Vec<CandidateOutcome>, EngineError> {
        if let Ok(mut seen) = self.seen_features.lock() {
            seen.extend(request.train.feature_names().into_iter().map(str::to_string));
        }
        Ok(self
            .aucs
            .iter()
            .enumerate()
            .map(|(grid_index, &auc)| {
                let metrics = Metrics::BinaryClassification(BinaryClassificationMetrics {
                    auc_roc: auc,
                    accuracy: 0.5,
                    precision: 0.5,
                    recall: 0.5,
                    f1: 0.5,
                    baseline_accuracy: 0.5,
                    thresholds: Vec::new(),
                });
                CandidateOutcome {
                    grid_index,
                    family: ModelFamily::Tree,
                    comparison_metrics: metrics.clone(),
                    test_metrics: metrics,
                    model: Box::new(ConstantModel(auc)),
                }
            })
            .collect())
    }
}

/// 100 rows of {a: number, b: enum[x,y], target: enum[pos,neg]}.
fn frame() -> TableInput {
    let records = (0..100)
        .map(|i| {
            let a = i as f64;
            json!({
                "a": a,
                "b": if i % 2 == 0 { "x" } else { "y" },
                "target": if i >= 50 { "pos" } else { "neg" },
            })
            .as_object()
            .unwrap()
            .clone()
        })
        .collect();
    TableInput::from(RecordFrame::new(records).with_columns(vec![
        "a".to_string(),
        "b".to_string(),
        "target".to_string(),
    ]))
}

fn declared_types() -> TrainingConfig {
    TrainingConfig {
        column_types: vec![
            ColumnTypeOverride::new(
                "b",
                ColumnType::Enum {
                    variants: vec!["x".to_string(), "y".to_string()],
                },
            ),
            ColumnTypeOverride::new(
                "target",
                ColumnType::Enum {
                    variants: vec!["pos".to_string(), "neg".to_string()],
                },
            ),
        ],
        ..Default::default()
    }
}

#[test]
fn test_selects_higher_auc() {
    // Arrange
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.81, 0.83]));

    // Act
    let model = dispatcher
        .train(&frame(), None, "target", &declared_types())
        .unwrap();

    // Assert
    let selected: Vec<_> = model.candidates().iter().map(|c| c.selected).collect();
    assert_eq!(selected, vec![false, true]);
    assert_eq!(model.candidates()[1].comparison_metric, ComparisonMetric::Auc);
    assert_eq!(model.candidates()[1].comparison_score, Some(0.83));
}

#[test]
fn test_tie_keeps_first_candidate() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.81, 0.81]));

    let model = dispatcher
        .train(&frame(), None, "target", &declared_types())
        .unwrap();

    assert!(model.candidates()[0].selected);
    assert!(!model.candidates()[1].selected);
}

#[test]
fn test_engine_sees_features_in_declared_order() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));

    let model = dispatcher
        .train(&frame(), None, "target", &declared_types())
        .unwrap();

    let seen = dispatcher.engine().seen_features.lock().unwrap().clone();
    assert_eq!(seen, vec!["a", "b"]);
    let schema_names: Vec<_> = model.schema().features.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(schema_names, vec!["a", "b"]);
    assert_eq!(model.schema().task, Task::BinaryClassification);
}

#[test]
fn test_unknown_override_is_rejected() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));
    let mut config = declared_types();
    config
        .column_types
        .push(ColumnTypeOverride::new("missing", ColumnType::Number));

    let result = dispatcher.train(&frame(), None, "target", &config);

    assert!(matches!(result, Err(TabulaError::UnknownColumnOverride(ref name)) if name == "missing"));
}

#[test]
fn test_missing_target_is_rejected() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));

    let result = dispatcher.train(&frame(), None, "label", &TrainingConfig::default());

    assert!(matches!(result, Err(TabulaError::MissingTargetColumn(ref name)) if name == "label"));
}

#[test]
fn test_foreign_tables_are_rejected() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));
    let foreign = TableInput::foreign("polars.DataFrame");

    let train_result = dispatcher.train(&foreign, None, "target", &TrainingConfig::default());
    let test_result = dispatcher.train(&frame(), Some(&foreign), "target", &declared_types());

    assert!(matches!(train_result, Err(TabulaError::UnsupportedTableKind { .. })));
    assert!(matches!(test_result, Err(TabulaError::InconsistentTableKinds { .. })));
}

#[test]
fn test_test_table_must_carry_train_columns() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));
    let test = TableInput::from(
        RecordFrame::from_json_str(r#"[{"a": 1.0, "target": "pos"}]"#).unwrap(),
    );

    let result = dispatcher.train(&frame(), Some(&test), "target", &declared_types());

    assert!(matches!(result, Err(TabulaError::TestSchemaMismatch(ref name)) if name == "b"));
}

#[test]
fn test_metric_must_fit_task() {
    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));
    let config = TrainingConfig {
        comparison_metric: Some(ComparisonMetric::Rmse),
        ..declared_types()
    };

    let result = dispatcher.train(&frame(), None, "target", &config);

    assert!(matches!(
        result,
        Err(TabulaError::IncompatibleComparisonMetric { .. })
    ));
}

#[test]
fn test_end_to_end_with_reference_engine() {
    // Arrange
    let sink = Arc::new(MemorySink::new());
    let dispatcher = Dispatcher::new(ReferenceEngine::new()).with_sink(sink.clone());
    let config = TrainingConfig {
        grid: Some(vec![GridItem::Linear(LinearGridItem::default())]),
        ..declared_types()
    };

    // Act
    let model = dispatcher.train(&frame(), None, "target", &config).unwrap();
    let input = PredictInput::new().with("a", 10.0).with("b", "x");
    let output = model.predict(&input, &PredictOptions::default()).unwrap();
    model.log_prediction("row-10", input, output.clone(), None);

    // Assert
    assert_eq!(model.candidates().len(), 1);
    assert!(matches!(model.test_metrics(), Metrics::BinaryClassification(_)));
    let PredictOutput::BinaryClassification(prediction) = output else {
        panic!("expected a binary prediction");
    };
    assert!(prediction.class_name == "pos" || prediction.class_name == "neg");
    assert!((0.0..=1.0).contains(&prediction.probability));
    assert!(matches!(sink.events().as_slice(), [TelemetryEvent::Prediction(_)]));
}

#[test]
fn test_integer_enum_override_trains_and_predicts() {
    let records = (0..100)
        .map(|i| {
            json!({
                "a": i as f64,
                "b": 1 + i % 2,
                "target": if i >= 50 { "pos" } else { "neg" },
            })
            .as_object()
            .unwrap()
            .clone()
        })
        .collect();
    let train = TableInput::from(RecordFrame::new(records));
    let config = TrainingConfig {
        column_types: vec![ColumnTypeOverride::new(
            "b",
            ColumnType::Enum {
                variants: vec!["1".to_string(), "2".to_string()],
            },
        )],
        grid: Some(vec![GridItem::Linear(LinearGridItem::default())]),
        ..Default::default()
    };

    let model = Dispatcher::new(ReferenceEngine::new())
        .train(&train, None, "target", &config)
        .unwrap();

    // The category reads the same whether it arrives as a number or a string.
    let numeric = PredictInput::new().with("a", 3.0).with("b", 1.0);
    let text = PredictInput::new().with("a", 3.0).with("b", "2");
    assert!(model.predict(&numeric, &PredictOptions::default()).is_ok());
    assert!(model.predict(&text, &PredictOptions::default()).is_ok());
    let unknown = PredictInput::new().with("a", 3.0).with("b", 3.0);
    assert!(matches!(
        model.predict(&unknown, &PredictOptions::default()),
        Err(TabulaError::InvalidCategory { ref value, .. }) if value == "3"
    ));
}

#[test]
fn test_failed_test_export_releases_train_columns() {
    // Arrange: "z" is outside the declared categories of "b".
    let config = declared_types();
    let test = TableInput::from(
        RecordFrame::from_json_str(r#"[{"a": 1.0, "b": "z", "target": "pos"}]"#).unwrap(),
    );
    let train_table = frame().normalize().unwrap();
    let test_table = test.normalize().unwrap();
    let plan = plan_columns(&train_table, &config.column_types).unwrap();
    let ledger = ExportLedger::new();

    // Act
    let result = export_inputs(&train_table, Some(&test_table), &plan, "target", &ledger);

    // Assert: three train columns and the test "a" column were exported, all released.
    assert!(matches!(
        result,
        Err(TabulaError::InvalidCategory { ref column, ref value }) if column == "b" && value == "z"
    ));
    assert_eq!(ledger.acquired(), 4);
    assert!(ledger.is_balanced());

    let dispatcher = Dispatcher::new(ScriptedEngine::new(&[0.5]));
    let trained = dispatcher.train(&frame(), Some(&test), "target", &config);
    assert!(matches!(trained, Err(TabulaError::InvalidCategory { .. })));
}
