use std::sync::Arc;

use serde_json::Value as JsonValue;

use storecore_checkout::{CartService, OrderService, StockService};
use storecore_events::{EventBus, EventEnvelope, InMemoryEventBus};
use storecore_infra::{
    CommandDispatcher, InMemoryEventStore,
    projections::{OrderReadModel, OrdersProjection, StockLevelReadModel, StockLevelsProjection},
    read_model::InMemoryReadStore,
};
use storecore_orders::OrderId;
use storecore_stock::UnitId;

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

type StockLevels = StockLevelsProjection<Arc<InMemoryReadStore<UnitId, StockLevelReadModel>>>;
type OrdersView = OrdersProjection<Arc<InMemoryReadStore<OrderId, OrderReadModel>>>;

/// Everything the handlers need, wired once at startup.
pub struct AppServices {
    pub stock: StockService<Store, Bus>,
    pub cart: CartService<Store, Bus>,
    pub orders: OrderService<Store, Bus>,
    pub stock_levels: Arc<StockLevels>,
    pub orders_view: Arc<OrdersView>,
}

/// In-memory wiring: store + bus + dispatcher + projections.
///
/// A background task drains the bus into the projections, so display reads are
/// eventually consistent while every command runs against rehydrated state.
pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let stock_levels: Arc<StockLevels> = Arc::new(StockLevelsProjection::new(Arc::new(
        InMemoryReadStore::new(),
    )));
    let orders_view: Arc<OrdersView> =
        Arc::new(OrdersProjection::new(Arc::new(InMemoryReadStore::new())));

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let stock_levels = stock_levels.clone();
        let orders_view = orders_view.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let applied = match env.aggregate_type() {
                            "stock.unit" => {
                                stock_levels.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "orders.order" => {
                                orders_view.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            _ => Ok(()),
                        };
                        if let Err(e) = applied {
                            tracing::warn!("projection apply failed: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

    AppServices {
        stock: StockService::new(Arc::clone(&dispatcher)),
        cart: CartService::new(Arc::clone(&dispatcher)),
        orders: OrderService::new(dispatcher),
        stock_levels,
        orders_view,
    }
}
