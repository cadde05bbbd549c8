use time::macros::{date, datetime, time};

use crate::{
    Condition, Database, DataType, DatabaseRegistry, DbEnum, DbError, Delete, Insert, InsertList,
    Match, MutationOutcome, Order, RowLookup, Select, Table, Update, Value, Where, ID_COLUMN,
    TABLE_OF_TABLES,
};

#[derive(Debug, PartialEq, Eq)]
enum Mood {
    Calm,
    Angry,
}

impl DbEnum for Mood {
    const TAG: &'static str = "MOOD";

    fn constant(&self) -> &'static str {
        match self {
            Mood::Calm => "CALM",
            Mood::Angry => "ANGRY",
        }
    }

    fn from_constant(constant: &str) -> Option<Self> {
        match constant {
            "CALM" => Some(Mood::Calm),
            "ANGRY" => Some(Mood::Angry),
            _ => None,
        }
    }
}

/// Helper: an in-memory database with a "users" table (name: Str, age: Int).
fn users_db() -> (Database, Table) {
    let db = Database::open_in_memory().unwrap();
    let users = db
        .create_table("users", |t| {
            t.column("name", DataType::Str)?;
            t.column("age", DataType::Int)?;
            Ok(())
        })
        .unwrap();
    (db, users)
}

fn insert_user(db: &Database, users: &Table, name: &str, age: i32) {
    let mut insert = Insert::into(users).unwrap();
    insert.set("name", name.into()).unwrap();
    insert.set("age", Value::Int(age)).unwrap();
    let outcome = db.insert(insert).unwrap();
    assert_eq!(outcome, MutationOutcome::Applied(1));
}

fn count_rows(db: &Database, table: &Table) -> usize {
    db.select(Select::from(table), |rows| {
        let mut n = 0;
        while rows.has_row() {
            rows.next(|_| Ok(()))?;
            n += 1;
        }
        Ok(n)
    })
    .unwrap()
}

// -----------------------------------------------------------------------
// 1. test_create_table_registers_implicit_id
// -----------------------------------------------------------------------
#[test]
fn test_create_table_registers_implicit_id() {
    let (db, users) = users_db();
    let columns = users.columns();
    assert_eq!(columns[0].name(), ID_COLUMN);
    assert_eq!(columns[0].data_type(), DataType::Id);
    assert_eq!(columns.len(), 3);

    assert!(db.table("USERS").is_ok()); // lookup is case-insensitive
    assert!(matches!(db.table("ghosts"), Err(DbError::Schema(_))));
    assert!(matches!(
        db.create_table("users", |_| Ok(())),
        Err(DbError::Schema(_))
    ));
}

// -----------------------------------------------------------------------
// 2. test_metadata_mirror_is_selectable_but_read_only
// -----------------------------------------------------------------------
#[test]
fn test_metadata_mirror_is_selectable_but_read_only() {
    let (db, _) = users_db();
    let meta = db.table(TABLE_OF_TABLES).unwrap();
    assert!(meta.is_read_only());

    // The user table shows up as a mirror row.
    let names = db
        .select(Select::from(&meta), |rows| {
            let mut names = Vec::new();
            while rows.has_row() {
                rows.next(|row| {
                    names.push(row.get_string("NAME")?);
                    Ok(())
                })?;
            }
            Ok(names)
        })
        .unwrap();
    assert!(names.iter().any(|n| n == "users"));

    assert!(matches!(Insert::into(&meta), Err(DbError::ReadOnly(_))));
    assert!(matches!(Update::table(&meta), Err(DbError::ReadOnly(_))));
    assert!(matches!(Delete::from(&meta), Err(DbError::ReadOnly(_))));
    assert!(matches!(
        db.drop_table(TABLE_OF_TABLES),
        Err(DbError::ReadOnly(_))
    ));
}

// -----------------------------------------------------------------------
// 3. test_type_mismatch_fails_before_any_sql
// -----------------------------------------------------------------------
#[test]
fn test_type_mismatch_fails_before_any_sql() {
    let (_, users) = users_db();

    let mut insert = Insert::into(&users).unwrap();
    assert!(matches!(
        insert.set("age", "old".into()),
        Err(DbError::TypeMismatch { .. })
    ));
    assert!(matches!(
        insert.set("ID", Value::Id(7)),
        Err(DbError::Schema(_))
    ));

    let w = Where::new(&users);
    assert!(matches!(
        w.equals("age", "thirty".into()),
        Err(DbError::TypeMismatch { .. })
    ));
    assert!(matches!(w.like("age", "3%"), Err(DbError::TypeMismatch { .. })));
    assert!(matches!(w.equals("ghost", Value::Int(1)), Err(DbError::Schema(_))));
}

// -----------------------------------------------------------------------
// 4. test_first_row_gets_id_zero
// -----------------------------------------------------------------------
#[test]
fn test_first_row_gets_id_zero() {
    let (db, users) = users_db();
    assert_eq!(db.biggest_id(&users).unwrap(), -1);

    insert_user(&db, &users, "Alice", 30);
    assert_eq!(db.biggest_id(&users).unwrap(), 0);
    insert_user(&db, &users, "Bob", 40);
    assert_eq!(db.biggest_id(&users).unwrap(), 1);

    let lookup = db
        .row_id(&users, &Where::new(&users).equals("name", "Alice".into()).unwrap())
        .unwrap();
    assert_eq!(lookup, RowLookup::Found(0));
}

// -----------------------------------------------------------------------
// 5. test_row_id_missing_and_not_unique
// -----------------------------------------------------------------------
#[test]
fn test_row_id_missing_and_not_unique() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Alice", 31);

    let w = Where::new(&users);
    assert_eq!(
        db.row_id(&users, &w.equals("name", "Bob".into()).unwrap())
            .unwrap(),
        RowLookup::Missing
    );
    assert_eq!(
        db.row_id(&users, &w.equals("name", "Alice".into()).unwrap())
            .unwrap(),
        RowLookup::NotUnique
    );
    assert_eq!(
        db.row_id(&users, &w.equals("age", Value::Int(31)).unwrap())
            .unwrap()
            .found(),
        Some(1)
    );

    // Conditions referencing another table's columns are rejected.
    let other = db
        .create_table("pets", |t| {
            t.column("species", DataType::Str)?;
            Ok(())
        })
        .unwrap();
    let foreign = Where::new(&other).equals("species", "cat".into()).unwrap();
    assert!(matches!(db.row_id(&users, &foreign), Err(DbError::Schema(_))));
}

// -----------------------------------------------------------------------
// 6. test_select_filter_projection_and_order
// -----------------------------------------------------------------------
#[test]
fn test_select_filter_projection_and_order() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);
    insert_user(&db, &users, "Carol", 20);

    let mut select = Select::from(&users);
    select.column("name").unwrap();
    select
        .filter(Where::new(&users).upper("age", Value::Int(25)).unwrap())
        .unwrap();
    select.order_by("age", Order::Descending).unwrap();

    let names = db
        .select(select, |rows| {
            let mut names = Vec::new();
            while rows.has_row() {
                rows.next(|row| {
                    names.push(row.get_string("name")?);
                    // "age" was not projected.
                    assert!(matches!(row.get_int("age"), Err(DbError::NotProjected(_))));
                    Ok(())
                })?;
            }
            Ok(names)
        })
        .unwrap();
    assert_eq!(names, vec!["Bob".to_string(), "Alice".to_string()]);
}

// -----------------------------------------------------------------------
// 7. test_cursor_state_machine
// -----------------------------------------------------------------------
#[test]
fn test_cursor_state_machine() {
    let (db, users) = users_db();

    // Empty result: no row buffered, next() fails immediately.
    db.select(Select::from(&users), |rows| {
        assert!(!rows.has_row());
        assert!(matches!(rows.next(|_| Ok(())), Err(DbError::CursorExhausted)));
        rows.close();
        rows.close(); // idempotent
        Ok(())
    })
    .unwrap();

    insert_user(&db, &users, "Alice", 30);
    db.select(Select::from(&users), |rows| {
        assert!(rows.has_row());
        rows.next(|row| {
            assert_eq!(row.get_id(ID_COLUMN)?, 0);
            Ok(())
        })?;
        // The engine ran dry, so the cursor self-closed.
        assert!(!rows.has_row());
        assert!(matches!(rows.next(|_| Ok(())), Err(DbError::CursorExhausted)));
        Ok(())
    })
    .unwrap();
}

// -----------------------------------------------------------------------
// 8. test_one_of_never_matches_on_empty_selection
// -----------------------------------------------------------------------
#[test]
fn test_one_of_never_matches_on_empty_selection() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);

    let mut select = Select::from(&users);
    select
        .filter(Where::new(&users).one_of("age", &[]).unwrap())
        .unwrap();
    assert_eq!(db.select(select, count_in_cursor).unwrap(), 0);

    let mut select = Select::from(&users);
    select
        .filter(
            Where::new(&users)
                .one_of("age", &[Value::Int(30), Value::Int(99)])
                .unwrap(),
        )
        .unwrap();
    assert_eq!(db.select(select, count_in_cursor).unwrap(), 1);
}

fn count_in_cursor(rows: &mut crate::DataRowResult<'_>) -> crate::DbResult<usize> {
    let mut n = 0;
    while rows.has_row() {
        rows.next(|_| Ok(()))?;
        n += 1;
    }
    Ok(n)
}

// -----------------------------------------------------------------------
// 9. test_delete_without_condition_deletes_everything
// -----------------------------------------------------------------------
#[test]
fn test_delete_without_condition_deletes_everything() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);

    let delete = Delete::from(&users).unwrap();
    assert_eq!(db.delete(delete).unwrap(), MutationOutcome::Applied(2));
    assert_eq!(count_rows(&db, &users), 0);

    // Condition::never is the guaranteed no-op.
    insert_user(&db, &users, "Alice", 30);
    let mut delete = Delete::from(&users).unwrap();
    delete.filter(Condition::never()).unwrap();
    assert_eq!(db.delete(delete).unwrap(), MutationOutcome::Applied(0));
    assert_eq!(count_rows(&db, &users), 1);
}

// -----------------------------------------------------------------------
// 10. test_update_and_upsert
// -----------------------------------------------------------------------
#[test]
fn test_update_and_upsert() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);

    // Plain update.
    let mut update = Update::table(&users).unwrap();
    update.set("age", Value::Int(31)).unwrap();
    update
        .filter(Where::new(&users).equals("name", "Alice".into()).unwrap())
        .unwrap();
    assert_eq!(db.update(update).unwrap(), MutationOutcome::Applied(1));

    // Upsert against an existing unique row updates it in place.
    let mut insert = Insert::into(&users).unwrap();
    insert.set("name", "Alice".into()).unwrap();
    insert.set("age", Value::Int(32)).unwrap();
    insert
        .update_if_exactly_one_row_match(
            Where::new(&users).equals("name", "Alice".into()).unwrap(),
        )
        .unwrap();
    assert_eq!(db.insert(insert).unwrap(), MutationOutcome::Applied(1));
    assert_eq!(count_rows(&db, &users), 1);

    let ages = select_ages(&db, &users, "Alice");
    assert_eq!(ages, vec![32]);

    // Upsert with no matching row falls back to a plain insert.
    let mut insert = Insert::into(&users).unwrap();
    insert.set("name", "Bob".into()).unwrap();
    insert.set("age", Value::Int(50)).unwrap();
    insert
        .update_if_exactly_one_row_match(
            Where::new(&users).equals("name", "Bob".into()).unwrap(),
        )
        .unwrap();
    assert_eq!(db.insert(insert).unwrap(), MutationOutcome::Applied(1));
    assert_eq!(count_rows(&db, &users), 2);
}

fn select_ages(db: &Database, users: &Table, name: &str) -> Vec<i32> {
    let mut select = Select::from(users);
    select
        .filter(Where::new(users).equals("name", name.into()).unwrap())
        .unwrap();
    db.select(select, |rows| {
        let mut ages = Vec::new();
        while rows.has_row() {
            rows.next(|row| {
                ages.push(row.get_int("age")?);
                Ok(())
            })?;
        }
        Ok(ages)
    })
    .unwrap()
}

// -----------------------------------------------------------------------
// 11. test_insert_list
// -----------------------------------------------------------------------
#[test]
fn test_insert_list() {
    let (db, users) = users_db();
    let mut list = InsertList::new(&users).unwrap();
    for (name, age) in [("Alice", 30), ("Bob", 40), ("Carol", 20)] {
        let mut insert = Insert::into(&users).unwrap();
        insert.set("name", name.into()).unwrap();
        insert.set("age", Value::Int(age)).unwrap();
        list.add(insert).unwrap();
    }
    assert_eq!(list.len(), 3);
    assert_eq!(db.insert_list(list).unwrap(), MutationOutcome::Applied(3));
    assert_eq!(db.biggest_id(&users).unwrap(), 2);
}

// -----------------------------------------------------------------------
// 12. test_insert_fills_unset_columns_with_defaults
// -----------------------------------------------------------------------
#[test]
fn test_insert_fills_unset_columns_with_defaults() {
    let db = Database::open_in_memory().unwrap();
    let table = db
        .create_table("profiles", |t| {
            t.column("nick", DataType::Str)?;
            t.column("score", DataType::Int)?;
            t.column_with_default("level", DataType::Int, Value::Int(5))?;
            Ok(())
        })
        .unwrap();

    db.insert(Insert::into(&table).unwrap()).unwrap();
    db.select(Select::from(&table), |rows| {
        rows.next(|row| {
            assert_eq!(row.get_string("nick")?, "");
            assert_eq!(row.get_int("score")?, 0);
            assert_eq!(row.get_int("level")?, 5);
            Ok(())
        })
    })
    .unwrap();
}

// -----------------------------------------------------------------------
// 13. test_all_data_types_round_trip
// -----------------------------------------------------------------------
#[test]
fn test_all_data_types_round_trip() {
    let db = Database::open_in_memory().unwrap();
    let table = db
        .create_table("specimens", |t| {
            t.column("s", DataType::Str)?;
            t.column("b", DataType::Bool)?;
            t.column("y", DataType::Byte)?;
            t.column("h", DataType::Short)?;
            t.column("i", DataType::Int)?;
            t.column("l", DataType::Long)?;
            t.column("f", DataType::Float)?;
            t.column("d", DataType::Double)?;
            t.column("blob", DataType::Bytes)?;
            t.column("ints", DataType::IntArray)?;
            t.column("at", DataType::Calendar)?;
            t.column("day", DataType::Date)?;
            t.column("tod", DataType::Time)?;
            t.column_with_default(
                "mood",
                DataType::Enum,
                Value::from_enum(&Mood::Calm),
            )?;
            Ok(())
        })
        .unwrap();

    let stamp = datetime!(2020-05-01 12:30:45 UTC);
    let mut insert = Insert::into(&table).unwrap();
    insert.set("s", "O'Brien".into()).unwrap();
    insert.set("b", true.into()).unwrap();
    insert.set("y", Value::Byte(-7)).unwrap();
    insert.set("h", Value::Short(300)).unwrap();
    insert.set("i", Value::Int(-40)).unwrap();
    insert.set("l", Value::Long(1 << 40)).unwrap();
    insert.set("f", Value::Float(1.5)).unwrap();
    insert.set("d", Value::Double(2.25)).unwrap();
    insert.set("blob", Value::Bytes(vec![0, 1, 254, 255])).unwrap();
    insert.set("ints", Value::IntArray(vec![1, -2, 3])).unwrap();
    insert.set("at", Value::Calendar(stamp)).unwrap();
    insert.set("day", Value::Date(date!(2024 - 02 - 29))).unwrap();
    insert.set("tod", Value::Time(time!(13:45:00))).unwrap();
    insert.set_enum("mood", &Mood::Angry).unwrap();
    db.insert(insert).unwrap();

    db.select(Select::from(&table), |rows| {
        rows.next(|row| {
            assert_eq!(row.get_string("s")?, "O'Brien");
            assert!(row.get_bool("b")?);
            assert_eq!(row.get_byte("y")?, -7);
            assert_eq!(row.get_short("h")?, 300);
            assert_eq!(row.get_int("i")?, -40);
            assert_eq!(row.get_long("l")?, 1 << 40);
            assert_eq!(row.get_float("f")?, 1.5);
            assert_eq!(row.get_double("d")?, 2.25);
            assert_eq!(row.get_bytes("blob")?, vec![0, 1, 254, 255]);
            assert_eq!(row.get_int_array("ints")?, vec![1, -2, 3]);
            assert_eq!(row.get_calendar("at")?, stamp);
            assert_eq!(row.get_date("day")?, date!(2024 - 02 - 29));
            assert_eq!(row.get_time("tod")?, time!(13:45:00));
            assert_eq!(row.get_enum::<Mood>("mood")?, Mood::Angry);
            Ok(())
        })
    })
    .unwrap();
}

// -----------------------------------------------------------------------
// 14. test_structural_column_operations
// -----------------------------------------------------------------------
#[test]
fn test_structural_column_operations() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);

    db.append_column(&users, "city", DataType::Str).unwrap();
    db.append_column_with_default(&users, "mood", DataType::Enum, Value::from_enum(&Mood::Calm))
        .unwrap();
    // Enums without a default are rejected outright.
    assert!(matches!(
        db.append_column(&users, "mood2", DataType::Enum),
        Err(DbError::Schema(_))
    ));

    db.insert_column_before(&users, "age_group", DataType::Str, "age")
        .unwrap();
    let names: Vec<String> = users.columns().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["ID", "name", "age_group", "age", "city", "mood"]);

    // The pre-existing row kept its data and picked up the defaults.
    db.select(Select::from(&users), |rows| {
        rows.next(|row| {
            assert_eq!(row.get_string("name")?, "Alice");
            assert_eq!(row.get_int("age")?, 30);
            assert_eq!(row.get_string("age_group")?, "");
            assert_eq!(row.get_enum::<Mood>("mood")?, Mood::Calm);
            Ok(())
        })
    })
    .unwrap();

    db.remove_column(&users, "age_group").unwrap();
    assert!(!users.contains("age_group"));
    assert!(matches!(
        db.remove_column(&users, ID_COLUMN),
        Err(DbError::Schema(_))
    ));
}

// -----------------------------------------------------------------------
// 15. test_foreign_key_sweep_removes_orphans
// -----------------------------------------------------------------------
#[test]
fn test_foreign_key_sweep_removes_orphans() {
    let (db, users) = users_db();
    let tags = db
        .create_table("tags", |t| {
            t.column("label", DataType::Str)?;
            t.id_foreign("users", ID_COLUMN);
            Ok(())
        })
        .unwrap();

    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);
    for label in ["first", "second"] {
        let mut insert = Insert::into(&tags).unwrap();
        insert.set("label", label.into()).unwrap();
        db.insert(insert).unwrap();
    }
    assert_eq!(count_rows(&db, &tags), 2);

    // Deleting user 1 orphans tag 1; the sweep cleans it up.
    let mut delete = Delete::from(&users).unwrap();
    delete
        .filter(Where::new(&users).one_of_id(ID_COLUMN, &[1]).unwrap())
        .unwrap();
    db.delete(delete).unwrap();
    db.flush_sweeps();

    assert_eq!(count_rows(&db, &users), 1);
    assert_eq!(count_rows(&db, &tags), 1);
    db.select(Select::from(&tags), |rows| {
        rows.next(|row| {
            assert_eq!(row.get_id(ID_COLUMN)?, 0);
            Ok(())
        })
    })
    .unwrap();
}

// -----------------------------------------------------------------------
// 16. test_sweep_cascades_through_grandchildren
// -----------------------------------------------------------------------
#[test]
fn test_sweep_cascades_through_grandchildren() {
    let (db, users) = users_db();
    db.create_table("tags", |t| {
        t.column("label", DataType::Str)?;
        t.id_foreign("users", ID_COLUMN);
        Ok(())
    })
    .unwrap();
    let notes = db
        .create_table("notes", |t| {
            t.column("text", DataType::Str)?;
            t.id_foreign("tags", ID_COLUMN);
            Ok(())
        })
        .unwrap();
    let tags = db.table("tags").unwrap();

    insert_user(&db, &users, "Alice", 30);
    let mut insert = Insert::into(&tags).unwrap();
    insert.set("label", "first".into()).unwrap();
    db.insert(insert).unwrap();
    let mut insert = Insert::into(&notes).unwrap();
    insert.set("text", "remember".into()).unwrap();
    db.insert(insert).unwrap();

    // Removing the root row must eventually empty the whole chain, even
    // though the grandchild only becomes an orphan once the child is gone.
    db.delete(Delete::from(&users).unwrap()).unwrap();
    db.flush_sweeps();

    assert_eq!(count_rows(&db, &tags), 0);
    assert_eq!(count_rows(&db, &notes), 0);
}

// -----------------------------------------------------------------------
// 17. test_foreign_column_and_references
// -----------------------------------------------------------------------
#[test]
fn test_foreign_column_and_references() {
    let (db, users) = users_db();
    let posts = db
        .create_table("posts", |t| {
            t.column("title", DataType::Str)?;
            t.foreign("author", "users")?;
            Ok(())
        })
        .unwrap();
    let author = posts.column("author").unwrap();
    assert!(author.is_foreign());
    assert_eq!(author.foreign_table().unwrap(), "users");

    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);
    for (title, author_id) in [("a", 0i64), ("b", 1), ("c", 1)] {
        let mut insert = Insert::into(&posts).unwrap();
        insert.set("title", title.into()).unwrap();
        insert.set("author", Value::Long(author_id)).unwrap();
        db.insert(insert).unwrap();
    }

    let mut select = Select::from(&posts);
    select
        .filter(Where::new(&posts).references("author", 1).unwrap())
        .unwrap();
    assert_eq!(db.select(select, count_in_cursor).unwrap(), 2);

    // references() is reserved for foreign columns.
    assert!(matches!(
        Where::new(&posts).references("title", 1),
        Err(DbError::Schema(_))
    ));
}

// -----------------------------------------------------------------------
// 18. test_in_select_subquery
// -----------------------------------------------------------------------
#[test]
fn test_in_select_subquery() {
    let (db, users) = users_db();
    let posts = db
        .create_table("posts", |t| {
            t.column("title", DataType::Str)?;
            t.foreign("author", "users")?;
            Ok(())
        })
        .unwrap();

    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);
    let mut insert = Insert::into(&posts).unwrap();
    insert.set("title", "a".into()).unwrap();
    insert.set("author", Value::Long(1)).unwrap();
    db.insert(insert).unwrap();

    // Users who authored at least one post.
    let mut authors = Select::from(&posts);
    authors.column("author").unwrap();
    let matcher = Match::new(authors).unwrap();

    let mut select = Select::from(&users);
    select
        .filter(users.id_column().in_select(&matcher).unwrap())
        .unwrap();
    let names = db
        .select(select, |rows| {
            let mut names = Vec::new();
            while rows.has_row() {
                rows.next(|row| {
                    names.push(row.get_string("name")?);
                    Ok(())
                })?;
            }
            Ok(names)
        })
        .unwrap();
    assert_eq!(names, vec!["Bob".to_string()]);
}

// -----------------------------------------------------------------------
// 19. test_matching_regex
// -----------------------------------------------------------------------
#[test]
fn test_matching_regex() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);
    insert_user(&db, &users, "Bob", 40);
    insert_user(&db, &users, "Carol", 20);

    let cond = db.matching_regex(&users, "name", "^[AB]").unwrap();
    let mut select = Select::from(&users);
    select.filter(cond).unwrap();
    assert_eq!(db.select(select, count_in_cursor).unwrap(), 2);

    // Regex never runs against non-string columns.
    assert!(matches!(
        db.matching_regex(&users, "age", "^3"),
        Err(DbError::TypeMismatch { .. })
    ));
    // Invalid patterns surface the regex error.
    assert!(matches!(
        db.matching_regex(&users, "name", "["),
        Err(DbError::Regex(_))
    ));
}

// -----------------------------------------------------------------------
// 20. test_engine_failure_is_an_outcome_not_an_error
// -----------------------------------------------------------------------
#[test]
fn test_engine_failure_is_an_outcome_not_an_error() {
    let (db, users) = users_db();
    insert_user(&db, &users, "Alice", 30);

    // A stale handle passes DSL validation but the engine-side table is
    // gone; the mutation reports failure instead of erroring.
    db.drop_table("users").unwrap();
    let mut update = Update::table(&users).unwrap();
    update.set("age", Value::Int(99)).unwrap();
    assert_eq!(db.update(update).unwrap(), MutationOutcome::EngineFailure);

    // Same policy on the insert path, whose id-allocation query is the
    // first thing to hit the engine.
    let mut insert = Insert::into(&users).unwrap();
    insert.set("age", Value::Int(1)).unwrap();
    assert_eq!(db.insert(insert).unwrap(), MutationOutcome::EngineFailure);

    // And on delete.
    let delete = Delete::from(&users).unwrap();
    assert_eq!(db.delete(delete).unwrap(), MutationOutcome::EngineFailure);
}

// -----------------------------------------------------------------------
// 21. test_drop_table_cleans_the_mirror
// -----------------------------------------------------------------------
#[test]
fn test_drop_table_cleans_the_mirror() {
    let (db, _) = users_db();
    db.drop_table("users").unwrap();
    assert!(db.table("users").is_err());

    let meta = db.table(TABLE_OF_TABLES).unwrap();
    let names = db
        .select(Select::from(&meta), |rows| {
            let mut names = Vec::new();
            while rows.has_row() {
                rows.next(|row| {
                    names.push(row.get_string("NAME")?);
                    Ok(())
                })?;
            }
            Ok(names)
        })
        .unwrap();
    assert!(names.is_empty());
}

// -----------------------------------------------------------------------
// 22. test_close_rejects_further_work
// -----------------------------------------------------------------------
#[test]
fn test_close_rejects_further_work() {
    let (db, users) = users_db();
    db.close().unwrap();
    db.close().unwrap(); // idempotent

    assert!(matches!(db.table("users"), Err(DbError::State(_))));
    assert!(matches!(db.biggest_id(&users), Err(DbError::State(_))));
    let insert = Insert::into(&users).unwrap();
    assert!(matches!(db.insert(insert), Err(DbError::State(_))));
}

// -----------------------------------------------------------------------
// 23. test_reopen_restores_tables_and_rows
// -----------------------------------------------------------------------
#[test]
fn test_reopen_restores_tables_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let db = Database::open("admin", "hunter2", &path).unwrap();
        let users = db
            .create_table("users", |t| {
                t.column("name", DataType::Str)?;
                t.column("age", DataType::Int)?;
                Ok(())
            })
            .unwrap();
        db.id_foreign(
            &db.create_table("tags", |t| {
                t.column("label", DataType::Str)?;
                Ok(())
            })
            .unwrap(),
            "users",
            ID_COLUMN,
        )
        .unwrap();
        insert_user(&db, &users, "Alice", 30);
        db.close().unwrap();
    }

    let db = Database::open("admin", "hunter2", &path).unwrap();
    let users = db.table("users").unwrap();
    assert_eq!(users.columns().len(), 3);
    assert_eq!(users.column("age").unwrap().data_type(), DataType::Int);
    assert_eq!(count_rows(&db, &users), 1);

    // The ID foreign link survived the restart.
    let tags = db.table("tags").unwrap();
    assert_eq!(tags.id_column().foreign_table().unwrap(), "users");
    db.close().unwrap();
}

// -----------------------------------------------------------------------
// 24. test_wrong_credentials_are_rejected_before_the_engine
// -----------------------------------------------------------------------
#[test]
fn test_wrong_credentials_are_rejected_before_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let db = Database::open("admin", "hunter2", &path).unwrap();
    db.close().unwrap();

    assert!(matches!(
        Database::open("admin", "wrong", &path),
        Err(DbError::Credentials)
    ));
    assert!(matches!(
        Database::open("intruder", "hunter2", &path),
        Err(DbError::Credentials)
    ));
}

// -----------------------------------------------------------------------
// 25. test_registry_shares_open_instances
// -----------------------------------------------------------------------
#[test]
fn test_registry_shares_open_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let registry = DatabaseRegistry::new();

    let first = registry.open("admin", "hunter2", &path).unwrap();
    first
        .create_table("users", |t| {
            t.column("name", DataType::Str)?;
            Ok(())
        })
        .unwrap();

    // Second open reuses the live instance: the table is already loaded.
    let second = registry.open("admin", "hunter2", &path).unwrap();
    assert!(second.table("users").is_ok());
    assert_eq!(registry.len(), 1);

    // Wrong credentials against a live instance are rejected too.
    assert!(matches!(
        registry.open("admin", "wrong", &path),
        Err(DbError::Credentials)
    ));

    registry.close(&path).unwrap();
    assert!(registry.is_empty());
    assert!(first.is_closed());
}

// -----------------------------------------------------------------------
// 26. test_rapid_mutations_coalesce_into_a_consistent_state
// -----------------------------------------------------------------------
#[test]
fn test_rapid_mutations_coalesce_into_a_consistent_state() {
    let (db, users) = users_db();
    let tags = db
        .create_table("tags", |t| {
            t.column("label", DataType::Str)?;
            t.id_foreign("users", ID_COLUMN);
            Ok(())
        })
        .unwrap();

    for i in 0..10 {
        insert_user(&db, &users, &format!("user{i}"), i);
        let mut insert = Insert::into(&tags).unwrap();
        insert.set("label", format!("tag{i}").into()).unwrap();
        db.insert(insert).unwrap();
    }

    // Burst of deletes, each scheduling a sweep; they coalesce into a few
    // passes and the end state has no orphans.
    for id in [1i64, 3, 5, 7, 9] {
        let mut delete = Delete::from(&users).unwrap();
        delete
            .filter(Where::new(&users).one_of_id(ID_COLUMN, &[id]).unwrap())
            .unwrap();
        db.delete(delete).unwrap();
    }
    db.flush_sweeps();

    assert_eq!(count_rows(&db, &users), 5);
    assert_eq!(count_rows(&db, &tags), 5);
    db.select(Select::from(&tags), |rows| {
        while rows.has_row() {
            rows.next(|row| {
                assert_eq!(row.get_id(ID_COLUMN)? % 2, 0);
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap();
}

// -----------------------------------------------------------------------
// 27. test_mirror_round_trip_restores_every_column_kind
// -----------------------------------------------------------------------
#[test]
fn test_mirror_round_trip_restores_every_column_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let db = Database::open("admin", "hunter2", &path).unwrap();
        db.create_table("owners", |t| {
            t.column("name", DataType::Str)?;
            Ok(())
        })
        .unwrap();
        db.create_table("specimens", |t| {
            t.column("s", DataType::Str)?;
            t.column("b", DataType::Bool)?;
            t.column("y", DataType::Byte)?;
            t.column("h", DataType::Short)?;
            t.column("i", DataType::Int)?;
            t.column("l", DataType::Long)?;
            t.column("f", DataType::Float)?;
            t.column("d", DataType::Double)?;
            t.column("blob", DataType::Bytes)?;
            t.column("ints", DataType::IntArray)?;
            t.column("at", DataType::Calendar)?;
            t.column("day", DataType::Date)?;
            t.column("tod", DataType::Time)?;
            t.column_with_default("mood", DataType::Enum, Value::from_enum(&Mood::Calm))?;
            t.foreign("owner", "owners")?;
            t.id_foreign("owners", ID_COLUMN);
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open("admin", "hunter2", &path).unwrap();
    let specimens = db.table("specimens").unwrap();

    // Catalog order and every declared kind survived the mirror.
    let expected = [
        ("ID", DataType::Id),
        ("s", DataType::Str),
        ("b", DataType::Bool),
        ("y", DataType::Byte),
        ("h", DataType::Short),
        ("i", DataType::Int),
        ("l", DataType::Long),
        ("f", DataType::Float),
        ("d", DataType::Double),
        ("blob", DataType::Bytes),
        ("ints", DataType::IntArray),
        ("at", DataType::Calendar),
        ("day", DataType::Date),
        ("tod", DataType::Time),
        ("mood", DataType::Enum),
        ("owner", DataType::Long),
    ];
    let columns = specimens.columns();
    assert_eq!(columns.len(), expected.len());
    for (column, (name, data_type)) in columns.iter().zip(expected) {
        assert_eq!(column.name(), name);
        assert_eq!(column.data_type(), data_type);
    }

    // Both foreign-link flavors survived: the ID link and the implicit
    // foreign column.
    assert_eq!(specimens.id_column().foreign_table(), Some("owners"));
    assert_eq!(specimens.id_column().foreign_column(), Some("ID"));
    let owner = specimens.column("owner").unwrap();
    assert!(owner.is_foreign());
    assert_eq!(owner.foreign_table(), Some("owners"));
    assert_eq!(owner.foreign_column(), Some("ID"));

    // Default values survived too, the explicit enum default included: a
    // bare insert after the reopen applies them all.
    let owners = db.table("owners").unwrap();
    db.insert(Insert::into(&owners).unwrap()).unwrap();
    db.insert(Insert::into(&specimens).unwrap()).unwrap();
    db.select(Select::from(&specimens), |rows| {
        rows.next(|row| {
            assert_eq!(row.get_enum::<Mood>("mood")?, Mood::Calm);
            assert_eq!(row.get_date("day")?, date!(1970 - 01 - 01));
            assert_eq!(row.get_int_array("ints")?, Vec::<i32>::new());
            assert_eq!(row.get_long("owner")?, 0);
            Ok(())
        })
    })
    .unwrap();
    db.close().unwrap();
}

// -----------------------------------------------------------------------
// 28. test_close_releases_the_engine_connection
// -----------------------------------------------------------------------
#[test]
fn test_close_releases_the_engine_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let db = Database::open("admin", "hunter2", &path).unwrap();
    let users = db
        .create_table("users", |t| {
            t.column("name", DataType::Str)?;
            Ok(())
        })
        .unwrap();
    let mut insert = Insert::into(&users).unwrap();
    insert.set("name", "Alice".into()).unwrap();
    assert_eq!(db.insert(insert).unwrap(), MutationOutcome::Applied(1));

    // In WAL mode the write-ahead log exists while a connection is open
    // and is checkpointed away when the last connection closes.
    let wal = dir.path().join("store.db-wal");
    assert!(wal.exists());
    db.close().unwrap();
    assert!(!wal.exists());
}
