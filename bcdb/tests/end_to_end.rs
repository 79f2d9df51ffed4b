use bcdb::{row, BcdbError, Column, Config, DataType, Database, Table, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn setup_db() -> (TempDir, Database) {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(tmp.path()).unwrap();
    (tmp, db)
}

#[test]
fn unique_column_rejects_duplicate() {
    let (_tmp, db) = setup_db();
    let t = db
        .add_table("t", vec![Column::new("n", DataType::Integer).unique()])
        .unwrap();

    t.add_row(&row![5]).unwrap();
    let err = t.add_row(&row![5]).unwrap_err();
    assert!(matches!(err, BcdbError::Constraint(_)));
    assert_eq!(t.get_rows().unwrap(), vec![row![5]]);
}

#[test]
fn escaped_strings_survive_reopen() {
    let (tmp, db) = setup_db();
    let t = db
        .add_table("notes", vec![Column::new("body", DataType::String)])
        .unwrap();
    t.add_row(&row!["a\nb"]).unwrap();
    t.add_row(&row!["carriage\r\nreturn"]).unwrap();
    t.add_row(&row![r"C:\new\root"]).unwrap();
    drop(t);

    let raw = std::fs::read_to_string(tmp.path().join("notes")).unwrap();
    assert_eq!(raw.lines().count(), 4);
    assert!(raw.ends_with("C:\\\\new\\\\root\n"));

    let reopened = Database::open(tmp.path()).unwrap().get_table("notes").unwrap();
    assert_eq!(
        reopened.get_rows().unwrap(),
        vec![
            row!["a\nb"],
            row!["carriage\r\nreturn"],
            row![r"C:\new\root"]
        ]
    );
}

#[test]
fn reference_must_exist_first() {
    let (_tmp, db) = setup_db();
    let users = db
        .add_table(
            "users",
            vec![
                Column::new("user_id", DataType::Integer).unique(),
                Column::new("name", DataType::String),
            ],
        )
        .unwrap();
    let orders = db
        .add_table(
            "orders",
            vec![
                Column::new("order_id", DataType::Integer).unique(),
                Column::new("user_id", DataType::Integer).references("users"),
            ],
        )
        .unwrap();

    assert!(orders.add_row(&row![1, 42]).is_err());
    assert!(orders.get_rows().unwrap().is_empty());

    users.add_row(&row![42, "Alice"]).unwrap();
    orders.add_row(&row![1, 42]).unwrap();
    assert_eq!(orders.get_row_where("order_id", 1).unwrap(), row![1, 42]);
}

#[test]
fn failed_remove_rows_leaves_file_byte_identical() {
    let (tmp, db) = setup_db();
    let t = db
        .add_table("t", vec![Column::new("flag", DataType::Boolean)])
        .unwrap();
    t.add_rows(&[row![true], row![true], row![false]]).unwrap();
    let before = std::fs::read(tmp.path().join("t")).unwrap();

    assert!(t.remove_rows(|r| r[0] == Value::Boolean(true), Some(1)).is_err());
    assert_eq!(std::fs::read(tmp.path().join("t")).unwrap(), before);
}

#[test]
fn configured_database_from_yaml() {
    let tmp = TempDir::new().unwrap();
    let config = Config::from_yaml_str("remove_limit: 2\ncreate_directory: true\n").unwrap();
    let db = Database::open_with_config(tmp.path().join("data"), config).unwrap();
    let t = db
        .add_table("t", vec![Column::new("n", DataType::Integer)])
        .unwrap();
    t.add_rows(&[row![1], row![2], row![3]]).unwrap();

    assert!(t.remove_rows(|_| true, None).is_err());
    assert_eq!(t.remove_rows(|r| r[0] != Value::Integer(2), None).unwrap(), 2);
    assert_eq!(t.get_rows().unwrap(), vec![row![2]]);
}

#[test]
fn concurrent_appends_are_serialized() {
    let (_tmp, db) = setup_db();
    let t = Arc::new(
        db.add_table(
            "log",
            vec![
                Column::new("id", DataType::Integer).unique(),
                Column::new("msg", DataType::String),
            ],
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                for i in 0..10_i64 {
                    t.add_row(&row![worker * 100 + i, format!("worker {worker}")])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut ids: Vec<i64> = t
        .get_rows()
        .unwrap()
        .iter()
        .filter_map(|r| r[0].as_i64())
        .collect();
    ids.sort();
    let mut expected: Vec<i64> = (0..4).flat_map(|w| (0..10).map(move |i| w * 100 + i)).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn concurrent_duplicate_unique_value_admits_one() {
    let (_tmp, db) = setup_db();
    let t: Arc<Table> = Arc::new(
        db.add_table("t", vec![Column::new("n", DataType::Integer).unique()])
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = Arc::clone(&t);
            thread::spawn(move || t.add_row(&row![7]).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(t.get_rows().unwrap(), vec![row![7]]);
}

#[test]
fn map_then_filter_round() {
    let (_tmp, db) = setup_db();
    let t = db
        .add_table(
            "scores",
            vec![
                Column::new("player", DataType::String).unique(),
                Column::new("score", DataType::Float),
            ],
        )
        .unwrap();
    t.add_rows(&[row!["ann", 1.5], row!["bob", 4.0], row!["cyd", 2.25]])
        .unwrap();

    let doubled = t
        .map(
            |r| {
                let score = r[1].as_f64().unwrap_or_default();
                Some(vec![r[0].clone(), Value::Float(score * 2.0)])
            },
            true,
        )
        .unwrap();
    assert_eq!(doubled, vec![row!["ann", 3.0], row!["bob", 8.0], row!["cyd", 4.5]]);

    let high = t
        .filter(|r| r[1].as_f64().is_some_and(|s| s > 4.0), false)
        .unwrap();
    assert_eq!(high, vec![row!["bob", 8.0], row!["cyd", 4.5]]);
    assert_eq!(t.get_rows().unwrap().len(), 3);
}
