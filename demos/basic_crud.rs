//! Demo: Basic CRUD Operations
//!
//! Walks through every row store operation against a workbook in a
//! temporary directory.
//!
//! Run with: cargo run --example basic_crud

use eyre::Result;
use sheetstore::{Row, RowStore, Value};

fn main() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("people.xlsx");

    println!("SheetStore Basic CRUD Example");
    println!("=============================\n");
    println!("Workbook: {}\n", path.display());

    // Opening a missing file creates it with one empty sheet
    let mut store = RowStore::open(&path, "People")?;
    println!("Store opened, {} row(s).\n", store.len());

    // CREATE
    println!("1. INSERT");
    store.insert(Row::from([("ID", "1"), ("Name", "Alice"), ("Age", "25")]))?;
    store.insert(Row::from([("ID", "2"), ("Name", "Bob"), ("Age", "30")]))?;
    let mut carol = Row::from([("ID", "3"), ("Name", "Carol")]);
    carol.set("Age", 41);
    store.insert(carol)?;
    println!("   {} row(s) stored\n", store.len());

    // READ
    println!("2. SELECT Name = Alice");
    for row in store.select(&Row::from([("Name", "Alice")]))? {
        println!("   {}", serde_json::to_string(&row)?);
    }

    // Text and numbers never compare equal
    let mut typed = Row::new();
    typed.set("Age", Value::Number(25.0));
    match store.select(&typed) {
        Ok(rows) => println!("   unexpected: {} row(s)", rows.len()),
        Err(e) if e.is_not_found() => println!("   Age = 25 (number): {}", e),
        Err(e) => return Err(e.into()),
    }
    println!();

    // UPDATE
    println!("3. UPDATE Name = Alice SET Age = 26");
    let count = store.update(&Row::from([("Name", "Alice")]), &Row::from([("Age", "26")]))?;
    println!("   {} row(s) updated\n", count);

    // DELETE
    println!("4. DELETE ID = 2");
    let count = store.delete(&Row::from([("ID", "2")]))?;
    println!("   {} row(s) deleted, {} left\n", count, store.len());

    // COLUMNS
    println!("5. ADD COLUMN Country = Unknown, then REMOVE it");
    store.add_column("Country", "Unknown")?;
    println!("   header: {:?}", store.header());
    store.remove_column("Country")?;
    println!("   header: {:?}\n", store.header());

    // Reopen from disk to show the persisted state
    println!("6. REOPEN");
    let reopened = RowStore::open(&path, "People")?;
    for row in reopened.rows() {
        println!("   {}", serde_json::to_string(row)?);
    }
    println!();

    println!("7. SHEETS");
    println!("   {:?}", reopened.sheet_names()?);
    println!("   People exists: {}", reopened.sheet_exists("People")?);
    println!("   Archive exists: {}", reopened.sheet_exists("Archive")?);

    Ok(())
}
