/*
    scope_isolation.rs - Scope router write isolation

    All three stores are opened read-write so that only the editor scope stands
    between a write operation and a foreign area's store.
*/

use catalog_core::router::{Access, Operation, RouterError, ScopeRouter};
use catalog_core::store::{AccessMode, Area, AreaStores, EditorScope, Store, StorePaths};
use catalog_core::test_utils::{prepared_stores, row_count, LegacySeed, TEST_IO_TIMEOUT};
use std::cell::Cell;
use tempfile::TempDir;

fn all_writable(paths: &StorePaths) -> AreaStores {
    let open = |area| Store::open(area, paths.area(area), AccessMode::ReadWrite, TEST_IO_TIMEOUT);
    AreaStores::new(
        open(Area::Normati).unwrap(),
        open(Area::Commerciali).unwrap(),
        open(Area::Materiali).unwrap(),
    )
}

#[test]
fn test_foreign_writes_never_reach_storage() {
    let dir = TempDir::new().unwrap();
    let paths = prepared_stores(dir.path(), &LegacySeed::default()).unwrap();

    for granted in Area::ALL {
        let router = ScopeRouter::new(all_writable(&paths), EditorScope::Area(granted));

        for op in Operation::ALL
            .iter()
            .copied()
            .filter(|op| op.is_write() && op.area() != granted)
        {
            let touched = Cell::new(false);
            let result = router.dispatch(op, |conn| {
                touched.set(true);
                conn.execute("DELETE FROM item", [])?;
                Ok(())
            });

            assert!(!touched.get(), "{} reached storage under {}", op, granted);
            match result {
                Err(RouterError::ScopeDenied {
                    session, required, ..
                }) => {
                    assert_eq!(session, EditorScope::Area(granted));
                    assert_eq!(required, op.area());
                }
                other => panic!("{} under {}: unexpected {:?}", op, granted, other.err()),
            }
        }
    }

    assert!(row_count(&paths.normati, "item").unwrap() > 0);
}

#[test]
fn test_own_area_writes_and_all_reads_pass() {
    let dir = TempDir::new().unwrap();
    let paths = prepared_stores(dir.path(), &LegacySeed::default()).unwrap();

    for granted in Area::ALL {
        let router = ScopeRouter::new(all_writable(&paths), EditorScope::Area(granted));
        for op in Operation::ALL.iter().copied() {
            let allowed = op.access() == Access::Read || op.area() == granted;
            assert_eq!(
                router.route(op).is_ok(),
                allowed,
                "{} under {}",
                op,
                granted
            );
        }
    }
}

#[test]
fn test_write_lands_in_owning_store() {
    let dir = TempDir::new().unwrap();
    let paths = prepared_stores(dir.path(), &LegacySeed::default()).unwrap();
    let router = ScopeRouter::new(all_writable(&paths), EditorScope::Main);

    let before = row_count(&paths.materiali, "material").unwrap();
    router
        .dispatch(Operation::CreateMaterial, |conn| {
            conn.execute(
                "INSERT INTO material (id, code, description) VALUES (9001, 'S355JR', 'structural')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    assert_eq!(row_count(&paths.materiali, "material").unwrap(), before + 1);
}

#[test]
fn test_unknown_operation_name() {
    let dir = TempDir::new().unwrap();
    let paths = prepared_stores(dir.path(), &LegacySeed::default()).unwrap();
    let router = ScopeRouter::new(all_writable(&paths), EditorScope::Main);

    let err = router
        .dispatch_named("drop_everything", |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RouterError::UnknownOperation(name) if name == "drop_everything"));
}
