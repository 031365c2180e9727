//! 預留安全性質：任何操作序列後，RESERVED 總量不超過現有庫存

use std::sync::Arc;

use matflow::model::{
    ErrorKind, NullEventSink, Pricing, Profile, Quantity, ResourceKey, ResourceSelector,
    ResourceStock, SystemClock,
};
use matflow::store::{InMemoryCatalog, Store};
use matflow::ReservationManager;
use proptest::prelude::*;
use proptest::test_runner::Config;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Reserve(u32),
    Update(usize, u32),
    Cancel(usize),
    Consume(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_u32..30).prop_map(Op::Reserve),
        2 => (0_usize..16, 0_u32..30).prop_map(|(i, q)| Op::Update(i, q)),
        1 => (0_usize..16).prop_map(Op::Cancel),
        1 => (0_usize..16).prop_map(Op::Consume),
    ]
}

fn manager(stock: u32) -> (ReservationManager, ResourceKey) {
    let key = ResourceKey::tool("T-PROP");
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.upsert_resource(ResourceStock::new(
        key.clone(),
        "Property tool",
        Profile::Discrete,
        Decimal::from(stock),
        Pricing::PerUnit(Decimal::ONE),
    ));
    let manager = ReservationManager::new(
        catalog,
        Arc::new(Store::new()),
        Arc::new(NullEventSink),
        Arc::new(SystemClock),
    );
    (manager, key)
}

proptest! {
    #![proptest_config(Config::with_cases(128))]
    #[test]
    fn reserved_sum_never_exceeds_stock(
        stock in 0_u32..50,
        ops in proptest::collection::vec(op(), 1..40)
    ) {
        let (manager, key) = manager(stock);
        let stock = Decimal::from(stock);
        let mut ids: Vec<Uuid> = Vec::new();

        for op in ops {
            let before = manager.availability(&key).unwrap().reserved_quantity;
            match op {
                Op::Reserve(q) => {
                    let result = manager.reserve("WI-P", ResourceSelector::catalog(key.clone()), Quantity::Pieces(q));
                    // q ≤ S − R 時成功，否則回報可用量 S − R
                    prop_assert_eq!(result.is_ok(), Decimal::from(q) <= stock - before);
                    match result {
                        Ok(r) => ids.push(r.id),
                        Err(e) => prop_assert_eq!(e.kind(), ErrorKind::InsufficientResource),
                    }
                }
                Op::Update(i, q) if !ids.is_empty() => {
                    let _ = manager.update_reservation(ids[i % ids.len()], Quantity::Pieces(q));
                }
                Op::Cancel(i) if !ids.is_empty() => {
                    let _ = manager.cancel(ids[i % ids.len()]);
                }
                Op::Consume(i) if !ids.is_empty() => {
                    let _ = manager.consume(ids[i % ids.len()]);
                }
                _ => {}
            }

            let reserved = manager.availability(&key).unwrap().reserved_quantity;
            prop_assert!(reserved <= stock, "reserved {} > stock {}", reserved, stock);
        }
    }
}
