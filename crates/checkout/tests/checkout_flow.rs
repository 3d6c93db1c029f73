//! End-to-end service tests over the in-memory store and bus: reservation
//! arithmetic, checkout atomicity, cancellation and the race guarantees.

use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value as JsonValue;

use storecore_auth::Role;
use storecore_checkout::{
    CartService, CheckoutRequest, NewUnit, OrderService, ServiceError, StatusUpdate, StockService,
};
use storecore_core::{AggregateId, ExpectedVersion, ShopperId};
use storecore_events::{EventEnvelope, InMemoryEventBus};
use storecore_infra::{
    CommandDispatcher, EventStore, EventStoreError, InMemoryEventStore, StoredEvent,
    UncommittedEvent,
};
use storecore_orders::{OrderStatus, PaymentStatus, ShippingAddress};
use storecore_stock::UnitId;

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Harness {
    stock: StockService<Store, Bus>,
    cart: CartService<Store, Bus>,
    orders: OrderService<Store, Bus>,
}

fn harness() -> Harness {
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
    ));
    Harness {
        stock: StockService::new(Arc::clone(&dispatcher)),
        cart: CartService::new(Arc::clone(&dispatcher)),
        orders: OrderService::new(dispatcher),
    }
}

fn admin() -> Vec<Role> {
    vec![Role::admin()]
}

fn register(h: &Harness, name: &str, initial: u32) -> UnitId {
    h.stock
        .register_unit(
            &admin(),
            NewUnit {
                name: name.to_string(),
                unit_price: 2_000,
                initial_stock: initial,
                color_label: None,
                size_label: None,
            },
        )
        .unwrap()
        .id_typed()
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: ShippingAddress {
            full_name: "Sam Carter".to_string(),
            line1: "1 High Street".to_string(),
            line2: None,
            city: "Leeds".to_string(),
            postal_code: "LS1 1AA".to_string(),
            country: "GB".to_string(),
        },
        payment_method: "card".to_string(),
        notes: None,
    }
}

fn available(h: &Harness, unit_id: UnitId) -> u32 {
    h.stock.get_unit(unit_id).unwrap().available()
}

#[test]
fn add_and_remove_round_trip_restores_stock() {
    let h = harness();
    let unit_id = register(&h, "canvas tote", 5);
    let shopper = ShopperId::new();

    let cart = h.cart.add_item(shopper, unit_id, 3).unwrap();
    assert_eq!(cart.line(unit_id).unwrap().quantity, 3);
    assert_eq!(available(&h, unit_id), 2);

    let cart = h.cart.remove_item(shopper, unit_id).unwrap();
    assert!(cart.is_empty());
    assert_eq!(available(&h, unit_id), 5);
}

#[test]
fn add_more_than_available_reserves_nothing() {
    let h = harness();
    let unit_id = register(&h, "canvas tote", 2);
    let shopper = ShopperId::new();

    let err = h.cart.add_item(shopper, unit_id, 3).unwrap_err();
    match err {
        ServiceError::InsufficientStock {
            requested,
            available: avail,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(avail, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(available(&h, unit_id), 2);
    assert!(h.cart.view_cart(shopper).unwrap().is_empty());
}

#[test]
fn adding_existing_unit_merges_and_reserves_only_the_delta() {
    let h = harness();
    let unit_id = register(&h, "canvas tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    let cart = h.cart.add_item(shopper, unit_id, 1).unwrap();

    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.line(unit_id).unwrap().quantity, 3);
    assert_eq!(available(&h, unit_id), 2);
}

#[test]
fn change_quantity_moves_only_the_difference() {
    let h = harness();
    let unit_id = register(&h, "canvas tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    assert_eq!(available(&h, unit_id), 3);

    h.cart.change_quantity(shopper, unit_id, 5).unwrap();
    assert_eq!(available(&h, unit_id), 0);

    h.cart.change_quantity(shopper, unit_id, 1).unwrap();
    assert_eq!(available(&h, unit_id), 4);
}

#[test]
fn clearing_the_cart_releases_every_line() {
    let h = harness();
    let a = register(&h, "tote", 4);
    let b = register(&h, "beanie", 4);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, a, 2).unwrap();
    h.cart.add_item(shopper, b, 3).unwrap();

    let cart = h.cart.clear_cart(shopper).unwrap();
    assert!(cart.is_empty());
    assert_eq!(available(&h, a), 4);
    assert_eq!(available(&h, b), 4);

    // Clearing again is a no-op.
    assert!(h.cart.clear_cart(shopper).unwrap().is_empty());
}

#[test]
fn racing_shoppers_never_oversell_the_last_item() {
    let h = harness();
    let unit_id = register(&h, "last one", 1);

    let results: Vec<Result<(), ServiceError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cart = h.cart.clone();
                scope.spawn(move || {
                    cart.add_item(ShopperId::new(), unit_id, 1).map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|j| j.join().unwrap()).collect()
    });

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one shopper may win the last item");
    for r in results {
        if let Err(err) = r {
            assert!(matches!(err, ServiceError::InsufficientStock { .. }));
        }
    }
    assert_eq!(available(&h, unit_id), 0);
}

#[test]
fn checkout_freezes_the_cart_without_touching_the_ledger() {
    let h = harness();
    let unit_id = register(&h, "canvas tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    assert_eq!(available(&h, unit_id), 3);

    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
    assert_eq!(order.lines().len(), 1);
    assert_eq!(order.total(), 2 * 2_000);
    assert!(order.order_number().starts_with("SO-"));

    // Checkout commits the existing reservation; no second decrement.
    assert_eq!(available(&h, unit_id), 3);
    assert!(h.cart.view_cart(shopper).unwrap().is_empty());
}

#[test]
fn checkout_of_empty_cart_is_rejected() {
    let h = harness();
    let shopper = ShopperId::new();
    let err = h
        .orders
        .create_order(shopper, checkout_request())
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmptyCart));
}

#[test]
fn cancellation_restores_exact_quantities_exactly_once() {
    let h = harness();
    let a = register(&h, "tote", 5);
    let b = register(&h, "beanie", 7);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, a, 2).unwrap();
    h.cart.add_item(shopper, b, 4).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();
    assert_eq!(available(&h, a), 3);
    assert_eq!(available(&h, b), 3);

    let cancelled = h
        .orders
        .cancel_order(shopper, &[], order.id_typed())
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(available(&h, a), 5);
    assert_eq!(available(&h, b), 7);

    // A second cancel fails and must not release again.
    let err = h
        .orders
        .cancel_order(shopper, &[], order.id_typed())
        .unwrap_err();
    assert!(matches!(err, ServiceError::CancellationNotAllowed));
    assert_eq!(available(&h, a), 5);
    assert_eq!(available(&h, b), 7);
}

#[test]
fn ledger_survives_the_full_shopping_story() {
    let h = harness();
    let unit_id = register(&h, "limited print", 5);
    let alice = ShopperId::new();
    let bob = ShopperId::new();

    // Alice holds 3 of 5.
    h.cart.add_item(alice, unit_id, 3).unwrap();
    assert_eq!(available(&h, unit_id), 2);

    // Bob cannot take 3 while Alice's hold stands.
    let err = h.cart.add_item(bob, unit_id, 3).unwrap_err();
    match err {
        ServiceError::InsufficientStock {
            requested,
            available: avail,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(avail, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Alice checks out; availability is unchanged by the commit.
    let order = h.orders.create_order(alice, checkout_request()).unwrap();
    assert_eq!(available(&h, unit_id), 2);

    // Cancellation returns the full quantity.
    h.orders.cancel_order(alice, &[], order.id_typed()).unwrap();
    assert_eq!(available(&h, unit_id), 5);
}

#[test]
fn shipped_orders_keep_their_stock() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        h.orders
            .update_status(
                &admin(),
                order.id_typed(),
                StatusUpdate {
                    new_status: status,
                    tracking: None,
                },
            )
            .unwrap();
    }

    let err = h
        .orders
        .cancel_order(shopper, &[], order.id_typed())
        .unwrap_err();
    assert!(matches!(err, ServiceError::CancellationNotAllowed));
    assert_eq!(available(&h, unit_id), 3);
}

#[test]
fn admin_cancel_via_status_update_routes_through_the_release_path() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    let updated = h
        .orders
        .update_status(
            &admin(),
            order.id_typed(),
            StatusUpdate {
                new_status: OrderStatus::Cancelled,
                tracking: None,
            },
        )
        .unwrap();
    assert_eq!(updated.status(), OrderStatus::Cancelled);
    assert_eq!(available(&h, unit_id), 5);
}

#[test]
fn off_table_transitions_are_rejected() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 1).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    // Pending -> Shipped skips Processing.
    let err = h
        .orders
        .update_status(
            &admin(),
            order.id_typed(),
            StatusUpdate {
                new_status: OrderStatus::Shipped,
                tracking: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));

    // Cancelling a shipped order via the admin path speaks transitions too.
    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        h.orders
            .update_status(
                &admin(),
                order.id_typed(),
                StatusUpdate {
                    new_status: status,
                    tracking: None,
                },
            )
            .unwrap();
    }
    let err = h
        .orders
        .update_status(
            &admin(),
            order.id_typed(),
            StatusUpdate {
                new_status: OrderStatus::Cancelled,
                tracking: None,
            },
        )
        .unwrap_err();
    match err {
        ServiceError::InvalidTransition { from, to } => {
            assert_eq!(from, "shipped");
            assert_eq!(to, "cancelled");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn failed_payment_cancels_a_pending_order() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    let settled = h
        .orders
        .record_payment(order.id_typed(), PaymentStatus::Failed)
        .unwrap();
    assert_eq!(settled.payment_status(), PaymentStatus::Failed);
    assert_eq!(settled.status(), OrderStatus::Cancelled);
    assert_eq!(available(&h, unit_id), 5);
}

#[test]
fn successful_payment_only_marks_the_order_paid() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let shopper = ShopperId::new();

    h.cart.add_item(shopper, unit_id, 2).unwrap();
    let order = h.orders.create_order(shopper, checkout_request()).unwrap();

    let settled = h
        .orders
        .record_payment(order.id_typed(), PaymentStatus::Paid)
        .unwrap();
    assert_eq!(settled.payment_status(), PaymentStatus::Paid);
    assert_eq!(settled.status(), OrderStatus::Pending);
    assert_eq!(available(&h, unit_id), 3);
}

#[test]
fn strangers_cannot_read_or_cancel_someone_elses_order() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);
    let owner = ShopperId::new();
    let stranger = ShopperId::new();

    h.cart.add_item(owner, unit_id, 1).unwrap();
    let order = h.orders.create_order(owner, checkout_request()).unwrap();

    let err = h
        .orders
        .get_order(stranger, &[], order.id_typed())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden));

    let err = h
        .orders
        .cancel_order(stranger, &[], order.id_typed())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden));
    assert_eq!(available(&h, unit_id), 4);

    // An administrator may act on any order.
    h.orders
        .cancel_order(stranger, &admin(), order.id_typed())
        .unwrap();
    assert_eq!(available(&h, unit_id), 5);
}

#[test]
fn adjust_is_admin_only_and_signed() {
    let h = harness();
    let unit_id = register(&h, "tote", 5);

    let err = h.stock.adjust(&[], unit_id, 3).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden));

    let unit = h.stock.adjust(&admin(), unit_id, 3).unwrap();
    assert_eq!(unit.available(), 8);

    let unit = h.stock.adjust(&admin(), unit_id, -8).unwrap();
    assert_eq!(unit.available(), 0);

    let err = h.stock.adjust(&admin(), unit_id, -1).unwrap_err();
    assert!(matches!(err, ServiceError::InvariantViolation(_)));
}

/// Event store decorator that fires a one-shot hook just before appending a
/// batch containing the named event type, so a competing writer can be
/// interleaved at an exact point in a multi-stream flow.
struct InterleavingStore {
    inner: Arc<InMemoryEventStore>,
    trigger: &'static str,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl InterleavingStore {
    fn new(trigger: &'static str) -> Self {
        Self {
            inner: Arc::new(InMemoryEventStore::new()),
            trigger,
            hook: Mutex::new(None),
        }
    }

    fn arm(&self, hook: Box<dyn FnOnce() + Send>) {
        *self.hook.lock().unwrap() = Some(hook);
    }
}

impl EventStore for InterleavingStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.iter().any(|e| e.event_type == self.trigger) {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
        }
        self.inner.append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(aggregate_id)
    }
}

#[test]
fn checkout_cannot_swallow_a_line_added_mid_flight() {
    let store = Arc::new(InterleavingStore::new("cart.cleared"));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&store), bus));
    let stock = StockService::new(Arc::clone(&dispatcher));
    let cart = CartService::new(Arc::clone(&dispatcher));
    let orders = OrderService::new(dispatcher);

    let new_unit = |name: &str| NewUnit {
        name: name.to_string(),
        unit_price: 2_000,
        initial_stock: 5,
        color_label: None,
        size_label: None,
    };
    let unit_a = stock
        .register_unit(&admin(), new_unit("tote"))
        .unwrap()
        .id_typed();
    let unit_b = stock
        .register_unit(&admin(), new_unit("scarf"))
        .unwrap()
        .id_typed();

    let shopper = ShopperId::new();
    cart.add_item(shopper, unit_a, 2).unwrap();

    // A second tab adds another line between the order write and the
    // commit-clear of the first checkout attempt.
    {
        let cart = cart.clone();
        store.arm(Box::new(move || {
            cart.add_item(shopper, unit_b, 1).unwrap();
        }));
    }

    let order = orders.create_order(shopper, checkout_request()).unwrap();

    // The mid-flight line was not deleted without entering an order: the
    // re-snapshotted checkout froze both lines.
    assert_eq!(order.lines().len(), 2);
    assert!(
        order
            .lines()
            .iter()
            .any(|l| l.unit_id == unit_b && l.quantity == 1)
    );
    assert!(cart.view_cart(shopper).unwrap().is_empty());

    // Conservation per unit: registered stock is either available or
    // committed to this order, never lost.
    assert_eq!(stock.get_unit(unit_a).unwrap().available(), 3);
    assert_eq!(stock.get_unit(unit_b).unwrap().available(), 4);
}
