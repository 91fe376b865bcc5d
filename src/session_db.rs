use crate::heuristics::{ReceiptItem, ReceiptTotals};
use crate::model::{OrderLine, Person, SplitResult};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub struct SessionStore {
    conn: Connection,
}

/// A processed receipt as kept in the session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReceipt {
    pub uid: String,
    pub filename: String,
    pub ocr_text: String,
    pub totals: ReceiptTotals,
    pub items: Vec<ReceiptItem>,
    pub results: Vec<SplitResult>,
    /// Tip policy the split was computed with, as displayed.
    pub tip_policy: String,
    /// RFC 3339 timestamp supplied by the caller.
    pub processed_at: String,
}

const ORDER_COLUMNS: &str = "id, item_label, quantity, person_name, estimated_price, unit_price";

impl SessionStore {
    /// Open (or create) the session database. `":memory:"` gives a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS people (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                initial TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_label TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                person_name TEXT COLLATE NOCASE,
                estimated_price REAL,
                unit_price REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                uid TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                ocr_text TEXT NOT NULL,
                totals TEXT NOT NULL,
                items TEXT NOT NULL,
                results TEXT NOT NULL,
                tip_policy TEXT NOT NULL,
                processed_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_person_name ON orders(person_name)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_receipts_processed_at ON receipts(processed_at)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Generate a receipt uid from the file name, transcript and timestamp
    pub fn generate_uid(filename: &str, ocr_text: &str, processed_at: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(filename.as_bytes());
        hasher.update(ocr_text.as_bytes());
        hasher.update(processed_at.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    // --- people ---

    /// Names are compared with [`Person::name_key`], not SQLite's ASCII-only
    /// `NOCASE`, so `özlem` finds `Özlem`.
    pub fn find_person(&self, name: &str) -> SqliteResult<Option<Person>> {
        Ok(self
            .list_people()?
            .into_iter()
            .find(|p| p.matches_name(name)))
    }

    /// Return the person with this name, creating them first if needed.
    /// New people get a capitalised name, their initial and the next palette color.
    pub fn find_or_create_person(&self, name: &str) -> SqliteResult<(Person, bool)> {
        if let Some(existing) = self.find_person(name)? {
            return Ok((existing, false));
        }

        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        let person_name = Person::display_name(name);
        let initial = Person::initial_for(&person_name);
        let color = Person::palette_color(count);

        self.conn.execute(
            "INSERT INTO people (name, initial, color) VALUES (?1, ?2, ?3)",
            params![person_name, initial, color],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(person_id = id, name = %person_name, color = color, "Person created");

        Ok((
            Person {
                id,
                name: person_name,
                initial,
                color: color.to_string(),
            },
            true,
        ))
    }

    pub fn list_people(&self) -> SqliteResult<Vec<Person>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, initial, color FROM people ORDER BY id")?;
        let people = stmt.query_map([], Self::row_to_person)?;
        people.collect()
    }

    /// Rename a person and move their order lines along. Returns false when
    /// nobody has the old name or somebody else already has the new one.
    pub fn rename_person(&self, old_name: &str, new_name: &str) -> SqliteResult<bool> {
        let Some(person) = self.find_person(old_name)? else {
            return Ok(false);
        };
        if self.find_person(new_name)?.is_some_and(|other| other.id != person.id) {
            return Ok(false);
        }

        let renamed = Person::display_name(new_name);
        let order_ids = self.order_ids_for(&person.name)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE people SET name = ?1, initial = ?2 WHERE id = ?3",
            params![renamed, Person::initial_for(&renamed), person.id],
        )?;
        for id in &order_ids {
            tx.execute(
                "UPDATE orders SET person_name = ?1 WHERE id = ?2",
                params![renamed, id],
            )?;
        }
        tx.commit()?;

        info!(from = %person.name, to = %renamed, orders = order_ids.len(), "Person renamed");
        Ok(true)
    }

    /// Remove a person together with their order lines. Returns the number of
    /// order lines removed, or `None` when nobody has that name.
    pub fn remove_person(&self, name: &str) -> SqliteResult<Option<usize>> {
        let Some(person) = self.find_person(name)? else {
            return Ok(None);
        };

        let order_ids = self.order_ids_for(&person.name)?;
        let tx = self.conn.unchecked_transaction()?;
        for id in &order_ids {
            tx.execute("DELETE FROM orders WHERE id = ?1", params![id])?;
        }
        tx.execute("DELETE FROM people WHERE id = ?1", params![person.id])?;
        tx.commit()?;

        info!(name = %person.name, orders = order_ids.len(), "Person removed");
        Ok(Some(order_ids.len()))
    }

    /// Ids of the order lines assigned to `name`, folded like [`Person::matches_name`].
    fn order_ids_for(&self, name: &str) -> SqliteResult<Vec<i64>> {
        let key = Person::name_key(name);
        let mut stmt = self
            .conn
            .prepare("SELECT id, person_name FROM orders WHERE person_name IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let (id, person_name) = row?;
            if Person::name_key(&person_name) == key {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
        Ok(Person {
            id: row.get(0)?,
            name: row.get(1)?,
            initial: row.get(2)?,
            color: row.get(3)?,
        })
    }

    // --- orders ---

    pub fn insert_order(&self, line: &OrderLine) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO orders (item_label, quantity, person_name, estimated_price, unit_price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                line.item_label,
                line.quantity,
                line.person_name,
                line.estimated_price,
                line.unit_price,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(order_id = id, item = %line.item_label, qty = line.quantity, "Order line stored");
        Ok(id)
    }

    pub fn get_order(&self, id: i64) -> SqliteResult<Option<OrderLine>> {
        self.conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![id],
                Self::row_to_order,
            )
            .optional()
    }

    /// All order lines in insertion order.
    pub fn list_orders(&self) -> SqliteResult<Vec<OrderLine>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id"))?;
        let orders = stmt.query_map([], Self::row_to_order)?;
        orders.collect()
    }

    /// Change a line's quantity by `delta`. A line that drops to zero is
    /// deleted. Returns the new quantity, or `None` when the line is gone.
    pub fn adjust_quantity(&self, id: i64, delta: i64) -> SqliteResult<Option<u32>> {
        let Some(line) = self.get_order(id)? else {
            return Ok(None);
        };
        let quantity = i64::from(line.quantity) + delta;
        if quantity <= 0 {
            self.delete_order(id)?;
            return Ok(None);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.conn.execute(
            "UPDATE orders SET quantity = ?1 WHERE id = ?2",
            params![quantity, id],
        )?;
        info!(order_id = id, qty = quantity, "Order quantity changed");
        Ok(Some(quantity))
    }

    /// Assign a line to a person, or unassign it with `None`.
    pub fn assign_order(&self, id: i64, person_name: Option<&str>) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE orders SET person_name = ?1 WHERE id = ?2",
            params![person_name, id],
        )?;
        info!(order_id = id, person = ?person_name, "Order line assigned");
        Ok(changed > 0)
    }

    pub fn set_unit_price(&self, id: i64, price: Option<f64>) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE orders SET unit_price = ?1 WHERE id = ?2",
            params![price, id],
        )?;
        Ok(changed > 0)
    }

    /// Persist the unit price of every given line that has an id.
    pub fn update_prices(&self, lines: &[OrderLine]) -> SqliteResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        for line in lines {
            let Some(id) = line.id else { continue };
            updated += tx.execute(
                "UPDATE orders SET unit_price = ?1 WHERE id = ?2",
                params![line.unit_price, id],
            )?;
        }
        tx.commit()?;
        info!(updated = updated, "Order prices stored");
        Ok(updated)
    }

    pub fn delete_order(&self, id: i64) -> SqliteResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM orders WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!(order_id = id, "Order line removed");
        }
        Ok(removed > 0)
    }

    pub fn clear_orders(&self) -> SqliteResult<usize> {
        let removed = self.conn.execute("DELETE FROM orders", [])?;
        info!(removed = removed, "Orders cleared");
        Ok(removed)
    }

    fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderLine> {
        Ok(OrderLine {
            id: Some(row.get(0)?),
            item_label: row.get(1)?,
            quantity: row.get(2)?,
            person_name: row.get(3)?,
            estimated_price: row.get(4)?,
            unit_price: row.get(5)?,
        })
    }

    // --- receipts ---

    pub fn insert_receipt(&self, receipt: &StoredReceipt) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO receipts
                (uid, filename, ocr_text, totals, items, results, tip_policy, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                receipt.uid,
                receipt.filename,
                receipt.ocr_text,
                to_json(&receipt.totals)?,
                to_json(&receipt.items)?,
                to_json(&receipt.results)?,
                receipt.tip_policy,
                receipt.processed_at,
            ],
        )?;
        info!(uid = %receipt.uid, filename = %receipt.filename, items = receipt.items.len(), "Receipt stored");
        Ok(())
    }

    /// All receipts, newest first.
    pub fn list_receipts(&self) -> SqliteResult<Vec<StoredReceipt>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, filename, ocr_text, totals, items, results, tip_policy, processed_at
             FROM receipts
             ORDER BY processed_at DESC, rowid DESC",
        )?;
        let receipts = stmt.query_map([], Self::row_to_receipt)?;
        receipts.collect()
    }

    fn row_to_receipt(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredReceipt> {
        Ok(StoredReceipt {
            uid: row.get(0)?,
            filename: row.get(1)?,
            ocr_text: row.get(2)?,
            totals: from_json(row, 3)?,
            items: from_json(row, 4)?,
            results: from_json(row, 5)?,
            tip_policy: row.get(6)?,
            processed_at: row.get(7)?,
        })
    }

    /// Count of people, order lines and receipts
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let people: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        let orders: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        let receipts: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok((people, orders, receipts))
    }
}

fn to_json<T: Serialize>(value: &T) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> SqliteResult<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(":memory:").unwrap()
    }

    #[test]
    fn test_uid_generation() {
        let uid1 = SessionStore::generate_uid("bon.txt", "Totaal 8,00", "2026-01-01T20:00:00Z");
        let uid2 = SessionStore::generate_uid("bon.txt", "Totaal 8,00", "2026-01-01T20:00:00Z");
        let uid3 = SessionStore::generate_uid("bon.txt", "Totaal 9,00", "2026-01-01T20:00:00Z");

        assert_eq!(uid1, uid2);
        assert_ne!(uid1, uid3);
    }

    #[test]
    fn test_people_are_unique_case_insensitively() {
        let db = store();
        let (timo, created) = db.find_or_create_person("timo").unwrap();
        assert!(created);
        assert_eq!(timo.name, "Timo");
        assert_eq!(timo.initial, "T");
        assert_eq!(timo.color, "primary");

        let (again, created) = db.find_or_create_person("TIMO").unwrap();
        assert!(!created);
        assert_eq!(again.id, timo.id);

        let (bart, _) = db.find_or_create_person("Bart").unwrap();
        assert_eq!(bart.color, "amber");
        assert_eq!(db.list_people().unwrap().len(), 2);
    }

    #[test]
    fn test_non_ascii_names_fold_like_matches_name() {
        let db = store();
        let (ozlem, created) = db.find_or_create_person("özlem").unwrap();
        assert!(created);
        assert_eq!(ozlem.name, "Özlem");

        let (again, created) = db.find_or_create_person("ÖZLEM").unwrap();
        assert!(!created);
        assert_eq!(again.id, ozlem.id);

        db.insert_order(&OrderLine::new("thee", 1).for_person("ÖZLEM")).unwrap();
        assert!(db.rename_person("özlem", "öz").unwrap());
        assert_eq!(db.list_orders().unwrap()[0].person_name.as_deref(), Some("Öz"));
        assert_eq!(db.remove_person("ÖZ").unwrap(), Some(1));
        assert_eq!(db.get_counts().unwrap(), (0, 0, 0));
    }

    #[test]
    fn test_rename_onto_taken_name_refused() {
        let db = store();
        db.find_or_create_person("Timo").unwrap();
        db.find_or_create_person("Bart").unwrap();
        assert!(!db.rename_person("Timo", "bart").unwrap());
        assert_eq!(db.list_people().unwrap()[0].name, "Timo");
        // a case-only change of your own name is fine
        assert!(db.rename_person("Timo", "TIMO").unwrap());
    }

    #[test]
    fn test_rename_moves_order_lines() {
        let db = store();
        db.find_or_create_person("Timo").unwrap();
        db.insert_order(&OrderLine::new("bier", 2).for_person("Timo")).unwrap();

        assert!(db.rename_person("timo", "tim").unwrap());
        assert!(!db.rename_person("nobody", "x").unwrap());

        let people = db.list_people().unwrap();
        assert_eq!(people[0].name, "Tim");
        let orders = db.list_orders().unwrap();
        assert_eq!(orders[0].person_name.as_deref(), Some("Tim"));
    }

    #[test]
    fn test_remove_person_cascades() {
        let db = store();
        db.find_or_create_person("Timo").unwrap();
        db.find_or_create_person("Bart").unwrap();
        db.insert_order(&OrderLine::new("bier", 1).for_person("Timo")).unwrap();
        db.insert_order(&OrderLine::new("pizza", 1).for_person("timo")).unwrap();
        db.insert_order(&OrderLine::new("cola", 1).for_person("Bart")).unwrap();

        assert_eq!(db.remove_person("TIMO").unwrap(), Some(2));
        assert_eq!(db.remove_person("Timo").unwrap(), None);
        assert_eq!(db.get_counts().unwrap(), (1, 1, 0));
    }

    #[test]
    fn test_quantity_changes_and_auto_removal() {
        let db = store();
        let id = db
            .insert_order(&OrderLine::new("bier", 1).with_estimate(3.5))
            .unwrap();

        assert_eq!(db.adjust_quantity(id, 1).unwrap(), Some(2));
        assert_eq!(db.adjust_quantity(id, -1).unwrap(), Some(1));
        assert_eq!(db.adjust_quantity(id, -1).unwrap(), None);
        assert!(db.get_order(id).unwrap().is_none());
        assert_eq!(db.adjust_quantity(id, 1).unwrap(), None);
    }

    #[test]
    fn test_assign_price_and_clear() {
        let db = store();
        let id = db.insert_order(&OrderLine::new("nachos", 1)).unwrap();

        assert!(db.assign_order(id, Some("Bart")).unwrap());
        assert!(db.set_unit_price(id, Some(7.5)).unwrap());
        let line = db.get_order(id).unwrap().unwrap();
        assert_eq!(line.person_name.as_deref(), Some("Bart"));
        assert_eq!(line.unit_price, Some(7.5));
        assert_eq!(line.id, Some(id));

        assert!(db.assign_order(id, None).unwrap());
        assert!(!db.get_order(id).unwrap().unwrap().is_assigned());

        let mut lines = db.list_orders().unwrap();
        lines[0].unit_price = Some(8.0);
        assert_eq!(db.update_prices(&lines).unwrap(), 1);
        assert_eq!(db.get_order(id).unwrap().unwrap().unit_price, Some(8.0));

        assert_eq!(db.clear_orders().unwrap(), 1);
        assert!(!db.delete_order(id).unwrap());
    }

    #[test]
    fn test_receipts_listed_newest_first() {
        let db = store();
        for (name, at) in [
            ("first.txt", "2026-03-01T19:00:00Z"),
            ("second.txt", "2026-03-01T21:30:00Z"),
        ] {
            db.insert_receipt(&StoredReceipt {
                uid: SessionStore::generate_uid(name, "", at),
                filename: name.to_string(),
                ocr_text: String::new(),
                totals: ReceiptTotals {
                    total: Some(12.5),
                    ..Default::default()
                },
                items: vec![ReceiptItem {
                    label: "Bier".to_string(),
                    quantity: 2,
                    unit_price: Some(3.5),
                    line_total: Some(7.0),
                }],
                results: Vec::new(),
                tip_policy: "none".to_string(),
                processed_at: at.to_string(),
            })
            .unwrap();
        }

        let receipts = db.list_receipts().unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].filename, "second.txt");
        assert_eq!(receipts[1].totals.total, Some(12.5));
        assert_eq!(receipts[1].items[0].line_total, Some(7.0));
    }
}
