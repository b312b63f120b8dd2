use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use score_learning::{
    load_artifact, selection::split_features_target, ArtifactStore, CustomData, ModelCatalog,
    PipelineConfig, PipelineTelemetry, PredictPipeline, Preprocessor, Regressor, Table,
    TrainedModel, TrainingPipeline,
};
use tempfile::tempdir;

const HEADERS: [&str; 8] = [
    "gender",
    "race_ethnicity",
    "parental_level_of_education",
    "lunch",
    "test_preparation_course",
    "math_score",
    "reading_score",
    "writing_score",
];

fn synthetic_students(rows: usize, seed: u64) -> Table {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let groups = ["group A", "group B", "group C", "group D", "group E"];
    let education = [
        "associate's degree",
        "bachelor's degree",
        "high school",
        "master's degree",
        "some college",
        "some high school",
    ];
    let mut table = Table::new(HEADERS.iter().map(ToString::to_string).collect());
    for _ in 0..rows {
        let male = rng.gen_bool(0.5);
        let standard = rng.gen_bool(0.65);
        let prepared = rng.gen_bool(0.35);
        let reading = rng.gen_range(30.0..100.0_f64).round();
        let writing = (reading + rng.gen_range(-8.0..8.0_f64)).clamp(0.0, 100.0).round();
        let math = 0.5 * reading + 0.35 * writing
            + if male { 5.0 } else { 0.0 }
            + if standard { 7.0 } else { 0.0 }
            + if prepared { 2.0 } else { 0.0 }
            + rng.gen_range(-3.0..3.0_f64);
        table
            .push_row(vec![
                if male { "male" } else { "female" }.into(),
                groups[rng.gen_range(0..groups.len())].into(),
                education[rng.gen_range(0..education.len())].into(),
                if standard { "standard" } else { "free/reduced" }.into(),
                if prepared { "completed" } else { "none" }.into(),
                math.round().to_string(),
                reading.to_string(),
                writing.to_string(),
            ])
            .unwrap();
    }
    table
}

fn run_linear_pipeline(root: &std::path::Path) -> (PipelineConfig, f64) {
    let source = root.join("stud.csv");
    synthetic_students(100, 42).write_csv(&source).unwrap();
    let config = PipelineConfig {
        source_data_path: source,
        artifacts: ArtifactStore::under(root.join("artifacts")),
        ..PipelineConfig::default()
    };
    let summary = TrainingPipeline::new(config.clone(), PipelineTelemetry::disabled())
        .with_catalog(ModelCatalog::standard().only(&["Linear Regression"]))
        .run()
        .unwrap();
    (config, summary.test_r2)
}

#[test]
fn trains_and_serves_the_linear_model() {
    let dir = tempdir().unwrap();
    let (config, score) = run_linear_pipeline(dir.path());
    let store = &config.artifacts;

    let train = Table::read_csv(&store.train_data_path).unwrap();
    let test = Table::read_csv(&store.test_data_path).unwrap();
    assert_eq!(train.len(), 80);
    assert_eq!(test.len(), 20);
    assert_eq!(Table::read_csv(&store.raw_data_path).unwrap().len(), 100);

    let preprocessor: Preprocessor = load_artifact(&store.preprocessor_path).unwrap();
    // 2 numeric + 2 gender + 5 groups + 6 education + 2 lunch + 2 prep.
    assert_eq!(preprocessor.n_features_out(), 19);

    assert!(store.model_path.exists());
    assert!(score.is_finite());
    let model: TrainedModel = load_artifact(&store.model_path).unwrap();
    assert_eq!(model.name, "Linear Regression");
    assert_eq!(model.n_features, 19);

    let row = &test.rows()[0];
    let cell = |name: &str| row[test.column_index(name).unwrap()].clone();
    let record = CustomData {
        gender: cell("gender"),
        race_ethnicity: cell("race_ethnicity"),
        parental_level_of_education: cell("parental_level_of_education"),
        lunch: cell("lunch"),
        test_preparation_course: cell("test_preparation_course"),
        reading_score: cell("reading_score").parse().unwrap(),
        writing_score: cell("writing_score").parse().unwrap(),
    };
    let prediction = PredictPipeline::new(store).predict(&record).unwrap();
    assert!(prediction.is_finite());
}

#[test]
fn serving_matches_evaluation_time_predictions() {
    let dir = tempdir().unwrap();
    let (config, _) = run_linear_pipeline(dir.path());
    let store = &config.artifacts;
    let test = Table::read_csv(&store.test_data_path).unwrap();

    let preprocessor: Preprocessor = load_artifact(&store.preprocessor_path).unwrap();
    let model: TrainedModel = load_artifact(&store.model_path).unwrap();
    let schema = preprocessor.schema().clone();
    let features = preprocessor.transform(&test).unwrap();
    let data = score_learning::transformation::with_target(features, &test, &schema.target).unwrap();
    let (x, _) = split_features_target(&data).unwrap();
    let evaluated = model.model.predict(x).unwrap();

    let served = PredictPipeline::new(store).predict_table(&test).unwrap();
    assert_eq!(served.len(), evaluated.len());
    for (a, b) in served.iter().zip(evaluated.iter()) {
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
    }
}
