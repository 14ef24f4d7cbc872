use gdp_compare::data::{
    load_csv, parse_csv, write_csv, DataError, DataSchema, Dataset, RegressionData,
    SyntheticDesign,
};
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn schema(response: &str, exclude: &[&str], categorical: &[&str]) -> DataSchema {
    DataSchema {
        response: response.to_string(),
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
        categorical: categorical.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn test_parse_with_exclusion_and_categorical_encoding() {
    let text = "id,age,group,income,y\n1,30,b,2.5,4\n2,40,a,3.0,9\n3, 50 ,c,1.0,16\n";
    let data = parse_csv(text, &schema("y", &["id"], &["group"])).unwrap();

    assert_eq!(data.names(), &["age", "groupb", "groupc", "income"]);
    assert_eq!(
        data.X(),
        &array![
            [30.0, 1.0, 0.0, 2.5],
            [40.0, 0.0, 0.0, 3.0],
            [50.0, 0.0, 1.0, 1.0]
        ]
    );
    assert_eq!(data.y(), &array![4.0, 9.0, 16.0]);
    assert_eq!(data.n_obs(), 3);
}

#[test]
fn test_missing_value_is_reported_with_position() {
    let text = "x,y\n1,2\nNA,3\n";
    let err = parse_csv(text, &schema("y", &[], &[])).unwrap_err();
    assert!(matches!(
        err,
        DataError::MissingValue { ref column, row: 2 } if column == "x"
    ));
}

#[test]
fn test_non_numeric_entry() {
    let text = "x,y\n1,2\nabc,3\n";
    let err = parse_csv(text, &schema("y", &[], &[])).unwrap_err();
    assert!(matches!(err, DataError::NonNumeric { ref value, .. } if value == "abc"));
}

#[test]
fn test_negative_response_is_rejected() {
    let text = "x,y\n1,2\n2,-3\n";
    let err = parse_csv(text, &schema("y", &[], &[])).unwrap_err();
    assert!(matches!(err, DataError::NegativeResponse { row: 2, .. }));
}

#[test]
fn test_unknown_columns() {
    let text = "x,y\n1,2\n2,3\n";
    assert!(matches!(
        parse_csv(text, &schema("z", &[], &[])),
        Err(DataError::ColumnNotFound(name)) if name == "z"
    ));
    assert!(matches!(
        parse_csv(text, &schema("y", &["id"], &[])),
        Err(DataError::ColumnNotFound(name)) if name == "id"
    ));
}

#[test]
fn test_dataset_checks_shapes() {
    let x = Array2::zeros((3, 2));
    let y = array![1.0, 2.0, 3.0];
    assert!(matches!(
        Dataset::new(vec!["a".into()], x.clone(), y.clone()),
        Err(DataError::NameCountMismatch { expected: 2, found: 1 })
    ));
    assert!(matches!(
        Dataset::new(vec!["a".into(), "b".into()], x, array![1.0, 2.0]),
        Err(DataError::DimensionMismatch { x_rows: 3, y_len: 2 })
    ));
}

#[test]
fn test_synthetic_data_round_trips_through_csv() {
    let mut rng = StdRng::seed_from_u64(10);
    let design = SyntheticDesign::sparse(50, 5, 0.1);
    let data = design.generate(&mut rng).unwrap();
    assert_eq!(data.X().dim(), (50, 5));
    assert!(data.y().iter().all(|v| *v >= 0.0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simulated.csv");
    write_csv(&path, &data, "y").unwrap();
    let loaded = load_csv(&path, &schema("y", &["id"], &[])).unwrap();

    assert_eq!(loaded.names(), data.names());
    assert_eq!(loaded.X(), data.X());
    assert_eq!(loaded.y(), data.y());
}
