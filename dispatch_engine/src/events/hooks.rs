use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    AgentRejectedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderAssignedEvent,
    OrderCancelledEvent,
    PaymentConfirmedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_confirmed_producer: Vec<EventProducer<PaymentConfirmedEvent>>,
    pub order_assigned_producer: Vec<EventProducer<OrderAssignedEvent>>,
    pub agent_rejected_producer: Vec<EventProducer<AgentRejectedEvent>>,
    pub order_cancelled_producer: Vec<EventProducer<OrderCancelledEvent>>,
}

pub struct EventHandlers {
    pub on_payment_confirmed: Option<EventHandler<PaymentConfirmedEvent>>,
    pub on_order_assigned: Option<EventHandler<OrderAssignedEvent>>,
    pub on_agent_rejected: Option<EventHandler<AgentRejectedEvent>>,
    pub on_order_cancelled: Option<EventHandler<OrderCancelledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_confirmed = hooks.on_payment_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_assigned = hooks.on_order_assigned.map(|f| EventHandler::new(buffer_size, f));
        let on_agent_rejected = hooks.on_agent_rejected.map(|f| EventHandler::new(buffer_size, f));
        let on_order_cancelled = hooks.on_order_cancelled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_confirmed, on_order_assigned, on_agent_rejected, on_order_cancelled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_confirmed {
            result.payment_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_assigned {
            result.order_assigned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_agent_rejected {
            result.agent_rejected_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_cancelled {
            result.order_cancelled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_confirmed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_assigned {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_agent_rejected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_cancelled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_confirmed: Option<Handler<PaymentConfirmedEvent>>,
    pub on_order_assigned: Option<Handler<OrderAssignedEvent>>,
    pub on_agent_rejected: Option<Handler<AgentRejectedEvent>>,
    pub on_order_cancelled: Option<Handler<OrderCancelledEvent>>,
}

impl EventHooks {
    pub fn on_payment_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_order_assigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAssignedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_assigned = Some(Arc::new(f));
        self
    }

    pub fn on_agent_rejected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AgentRejectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_agent_rejected = Some(Arc::new(f));
        self
    }

    pub fn on_order_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCancelledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_cancelled = Some(Arc::new(f));
        self
    }
}
