use crate::store::StateStore;
use crate::{Order, OrderFields, OrderPipelineError, OrderStatus, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Persistence side of the pipeline.
///
/// Every call may fail with [`OrderPipelineError::ConcurrentModification`]
/// when the stored version moved underneath it.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn apply_create(&self, order_id: i64, fields: &OrderFields) -> Result<()>;

    async fn apply_update(&self, order_id: i64, fields: &OrderFields) -> Result<()>;

    async fn apply_cancel(&self, order_id: i64, fields: &OrderFields) -> Result<()>;
}

/// Optimistically versioned order store kept in memory
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: StateStore<i64, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_id(&self, order_id: i64) -> Result<Order> {
        self.orders
            .get(&order_id)
            .ok_or_else(|| OrderPipelineError::NotFound(format!("Order with id: '{}' not found", order_id)))
    }

    pub fn find_all(&self) -> Vec<Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Write `order` back unless someone else bumped the version since it was read
    pub fn save(&self, mut order: Order) -> Result<Order> {
        let read_version = order.version;
        order.version = read_version + 1;

        match self.orders.replace_if(&order.id, |current| current.version == read_version, order.clone()) {
            Some(true) => Ok(order),
            Some(false) => Err(OrderPipelineError::ConcurrentModification { order_id: order.id }),
            None => Err(OrderPipelineError::NotFound(format!("Order with id: '{}' not found", order.id))),
        }
    }
}

#[async_trait]
impl OrderService for InMemoryOrderStore {
    async fn apply_create(&self, order_id: i64, fields: &OrderFields) -> Result<()> {
        debug!("Attempting to create order {}", order_id);

        let mut order = Order::from_fields(fields);
        order.id = order_id;

        if !self.orders.insert_if_absent(order_id, order) {
            return Err(OrderPipelineError::Business(format!(
                "Order with id: '{}' already exists",
                order_id
            )));
        }

        info!("Successfully created order {}", order_id);
        Ok(())
    }

    async fn apply_update(&self, order_id: i64, fields: &OrderFields) -> Result<()> {
        debug!("Attempting to update order {}", order_id);

        let mut order = self.find_by_id(order_id)?;
        order.product_name = fields.product_name.clone();
        order.category_name = fields.category_name.clone();
        order.price = fields.price;
        order.quantity = fields.quantity;

        self.save(order)?;

        info!("Successfully updated order {}", order_id);
        Ok(())
    }

    async fn apply_cancel(&self, order_id: i64, _fields: &OrderFields) -> Result<()> {
        debug!("Attempting to cancel order {}", order_id);

        let mut order = self.find_by_id(order_id)?;

        if order.status == OrderStatus::Cancelled {
            warn!("Order {} is already cancelled", order_id);
            return Ok(());
        }

        order.status = OrderStatus::Cancelled;
        self.save(order)?;

        info!("Successfully cancelled order {}", order_id);
        Ok(())
    }
}
