//! Sample data and contexts for tests.

use std::sync::Arc;

use crate::context::RunContext;
use crate::core::Dataset;
use crate::io::csv::parse_csv;
use crate::io::MemoryStorage;

use super::ScriptedFetcher;

/// Orders used across tests: four orders over three products, all dated in 2023.
pub const ORDERS_CSV: &str = "\
order_id,product_id,quantity,order_date
1,101,2,2023-01-05
2,102,1,2023-01-06 10:30:00
3,101,3,2023-01-07
4,103,5,2023-01-08
";

/// Inventory used across tests. Product 104 has no orders.
pub const INVENTORY_CSV: &str = "\
product_id,product_name,stock
101,Widget,50
102,Gadget,20
103,Gizmo,0
104,Doohickey,7
";

/// [`ORDERS_CSV`] parsed as the `orders` dataset.
///
/// # Panics
///
/// Never, the fixture is well formed.
#[must_use]
pub fn sample_orders() -> Dataset {
    parse_csv(ORDERS_CSV, "orders").expect("orders fixture parses")
}

/// [`INVENTORY_CSV`] parsed as the `inventory` dataset.
///
/// # Panics
///
/// Never, the fixture is well formed.
#[must_use]
pub fn sample_inventory() -> Dataset {
    parse_csv(INVENTORY_CSV, "inventory").expect("inventory fixture parses")
}

/// A run context over fresh in-memory storage, returning a handle to that storage.
#[must_use]
pub fn memory_context() -> (MemoryStorage, RunContext) {
    let storage = MemoryStorage::new();
    let ctx = RunContext::new(
        "test",
        Arc::new(storage.clone()),
        Arc::new(ScriptedFetcher::new(Vec::new())),
    );
    (storage, ctx)
}

/// A run context over fresh in-memory storage.
#[must_use]
pub fn test_context() -> RunContext {
    memory_context().1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_join_on_three_products() {
        let joined = sample_orders()
            .inner_join(&sample_inventory(), "product_id", "transformed")
            .unwrap();
        assert_eq!(joined.len(), 4);
        assert_eq!(sample_inventory().len(), 4);
    }
}
