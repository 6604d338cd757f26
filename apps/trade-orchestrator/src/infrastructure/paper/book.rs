//! Order book behind the paper backend.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{BackendError, ModifyOrderRequest, PlaceOrderRequest};
use crate::domain::market::{AccountSummary, OrderSnapshot, OrderType, Quote};
use crate::domain::shared::{Side, Symbol, Ticket};

/// Units per lot.
const CONTRACT_SIZE: Decimal = dec!(100000);

/// First ticket handed out.
const FIRST_TICKET: u64 = 1_000;

const INVALID_STOPS: i32 = 130;
const UNKNOWN_SYMBOL: i32 = 4106;
const INVALID_TICKET: i32 = 4108;

/// State change caused by a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// A pending order became a position.
    Filled {
        /// Ticket.
        ticket: Ticket,
        /// Fill price.
        price: Decimal,
    },
    /// A position hit its stop-loss.
    StoppedOut {
        /// Ticket.
        ticket: Ticket,
        /// Exit price.
        price: Decimal,
    },
    /// A position hit its take-profit.
    TargetHit {
        /// Ticket.
        ticket: Ticket,
        /// Exit price.
        price: Decimal,
    },
    /// A pending order passed its expiry.
    Expired {
        /// Ticket.
        ticket: Ticket,
    },
}

/// Positions, pending orders, quotes and balance.
#[derive(Debug)]
pub struct OrderBook {
    orders: BTreeMap<Ticket, OrderSnapshot>,
    quotes: HashMap<Symbol, Quote>,
    balance: Decimal,
    next_ticket: u64,
}

impl OrderBook {
    /// Empty book with `balance`.
    pub fn new(balance: Decimal) -> Self {
        Self {
            orders: BTreeMap::new(),
            quotes: HashMap::new(),
            balance,
            next_ticket: FIRST_TICKET,
        }
    }

    /// Last quote of `symbol`.
    pub fn quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.quotes.get(symbol).cloned()
    }

    /// Replace the last quote and revalue positions.
    pub fn set_quote(&mut self, quote: Quote) {
        for order in self.orders.values_mut() {
            if order.symbol == quote.symbol && !order.is_pending() {
                order.profit = floating(order, quote.exit_price(order.side));
            }
        }
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    /// Snapshot of `ticket`.
    pub fn get(&self, ticket: Ticket) -> Option<OrderSnapshot> {
        self.orders.get(&ticket).cloned()
    }

    /// Every open position and pending order, by ticket.
    pub fn open_orders(&self) -> Vec<OrderSnapshot> {
        self.orders.values().cloned().collect()
    }

    /// Insert or replace an order, keeping tickets unique.
    pub fn insert(&mut self, order: OrderSnapshot) {
        self.next_ticket = self.next_ticket.max(order.ticket.value() + 1);
        self.orders.insert(order.ticket, order);
    }

    /// Balance plus floating profit.
    pub fn account(&self) -> AccountSummary {
        let floating: Decimal = self.orders.values().map(|order| order.profit).sum();
        AccountSummary {
            balance: self.balance,
            equity: self.balance + floating,
        }
    }

    /// Open a position or queue a pending order.
    pub fn place(&mut self, request: PlaceOrderRequest) -> Result<Ticket, BackendError> {
        if request.volume <= Decimal::ZERO {
            return Err(BackendError::invalid("volume must be positive"));
        }
        let quote = self.quote(&request.symbol);

        let (open_price, open_time) = if request.order_type.is_pending() {
            let price = request
                .price
                .ok_or_else(|| BackendError::invalid("pending order requires a price"))?;
            (price, quote.map_or_else(chrono::Utc::now, |q| q.time))
        } else {
            let quote = quote.ok_or_else(|| {
                BackendError::rejected(UNKNOWN_SYMBOL, format!("no price for {}", request.symbol))
            })?;
            (quote.entry_price(request.side), quote.time)
        };

        let reference = self
            .quote(&request.symbol)
            .filter(|_| !request.order_type.is_pending())
            .map_or(open_price, |q| q.exit_price(request.side));
        check_stops(request.side, reference, request.stop_loss, request.take_profit)?;

        let ticket = Ticket::new(self.next_ticket);
        self.next_ticket += 1;
        self.orders.insert(
            ticket,
            OrderSnapshot {
                ticket,
                symbol: request.symbol,
                side: request.side,
                order_type: request.order_type,
                volume: request.volume,
                open_price,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                open_time,
                magic: request.magic,
                comment: request.comment,
                profit: Decimal::ZERO,
            },
        );
        Ok(ticket)
    }

    /// Change stops, trigger price or expiry.
    pub fn modify(&mut self, request: &ModifyOrderRequest) -> Result<(), BackendError> {
        let reference = {
            let order = self.orders.get(&request.ticket).ok_or_else(|| invalid_ticket(request.ticket))?;
            if !order.is_pending() && (request.price.is_some() || request.expiration.is_some()) {
                return Err(BackendError::invalid("price and expiry apply to pending orders only"));
            }
            if order.is_pending() {
                request.price.unwrap_or(order.open_price)
            } else {
                self.quote(&order.symbol)
                    .map_or(order.open_price, |q| q.exit_price(order.side))
            }
        };

        let order = self
            .orders
            .get_mut(&request.ticket)
            .ok_or_else(|| invalid_ticket(request.ticket))?;
        let stop_loss = request.stop_loss.or(order.stop_loss);
        let take_profit = request.take_profit.or(order.take_profit);
        check_stops(order.side, reference, stop_loss, take_profit)?;

        order.stop_loss = stop_loss;
        order.take_profit = take_profit;
        if let Some(price) = request.price {
            order.open_price = price;
        }
        Ok(())
    }

    /// Close a position, fully or partially.
    pub fn close(&mut self, ticket: Ticket, volume: Option<Decimal>) -> Result<(), BackendError> {
        let order = self.orders.get(&ticket).ok_or_else(|| invalid_ticket(ticket))?;
        if order.is_pending() {
            return Err(invalid_ticket(ticket));
        }
        let exit = self
            .quote(&order.symbol)
            .map_or(order.open_price, |q| q.exit_price(order.side));

        match volume {
            Some(part) if part <= Decimal::ZERO => Err(BackendError::invalid("volume must be positive")),
            Some(part) if part < order.volume => {
                let mut closed = order.clone();
                closed.volume = part;
                self.balance += floating(&closed, exit);
                if let Some(order) = self.orders.get_mut(&ticket) {
                    order.volume -= part;
                    order.profit = floating(order, exit);
                }
                Ok(())
            }
            _ => {
                self.settle(ticket, exit);
                Ok(())
            }
        }
    }

    /// Delete a pending order. Positions are refused like unknown tickets.
    pub fn delete(&mut self, ticket: Ticket) -> Result<(), BackendError> {
        match self.orders.get(&ticket) {
            Some(order) if order.is_pending() => {
                self.orders.remove(&ticket);
                Ok(())
            }
            _ => Err(invalid_ticket(ticket)),
        }
    }

    /// Apply a tick to every order on its symbol.
    pub fn apply_tick(&mut self, quote: &Quote) -> Vec<BookEvent> {
        self.set_quote(quote.clone());
        let mut events = Vec::new();

        let tickets: Vec<Ticket> = self
            .orders
            .values()
            .filter(|order| order.symbol == quote.symbol)
            .map(|order| order.ticket)
            .collect();

        for ticket in tickets {
            let Some(order) = self.orders.get(&ticket) else {
                continue;
            };
            if order.is_pending() {
                if let Some(event) = self.trigger_pending(ticket, quote) {
                    events.push(event);
                }
                continue;
            }

            let exit = quote.exit_price(order.side);
            let stopped = order
                .stop_loss
                .is_some_and(|sl| order.side.favorable_move(sl, exit) <= Decimal::ZERO);
            let targeted = order
                .take_profit
                .is_some_and(|tp| order.side.favorable_move(tp, exit) >= Decimal::ZERO);
            if stopped {
                self.settle(ticket, exit);
                events.push(BookEvent::StoppedOut { ticket, price: exit });
            } else if targeted {
                self.settle(ticket, exit);
                events.push(BookEvent::TargetHit { ticket, price: exit });
            }
        }
        events
    }

    fn trigger_pending(&mut self, ticket: Ticket, quote: &Quote) -> Option<BookEvent> {
        let order = self.orders.get_mut(&ticket)?;
        if order.open_time > quote.time {
            return None;
        }
        let market = quote.entry_price(order.side);
        let triggered = match (order.order_type, order.side) {
            (OrderType::Limit, Side::Buy) | (OrderType::Stop, Side::Sell) => market <= order.open_price,
            (OrderType::Limit, Side::Sell) | (OrderType::Stop, Side::Buy) => market >= order.open_price,
            (OrderType::Market, _) => false,
        };
        if !triggered {
            return None;
        }
        order.order_type = OrderType::Market;
        order.open_price = market;
        order.open_time = quote.time;
        order.profit = floating(order, quote.exit_price(order.side));
        Some(BookEvent::Filled {
            ticket,
            price: market,
        })
    }

    fn settle(&mut self, ticket: Ticket, exit: Decimal) {
        if let Some(order) = self.orders.remove(&ticket) {
            self.balance += floating(&order, exit);
        }
    }
}

fn floating(order: &OrderSnapshot, exit: Decimal) -> Decimal {
    order.side.favorable_move(order.open_price, exit) * order.volume * CONTRACT_SIZE
}

fn invalid_ticket(ticket: Ticket) -> BackendError {
    BackendError::rejected(INVALID_TICKET, format!("invalid ticket {ticket}"))
}

/// Stops must sit on the losing side of `reference` and targets on the
/// winning side.
fn check_stops(
    side: Side,
    reference: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<(), BackendError> {
    if stop_loss.is_some_and(|sl| side.favorable_move(reference, sl) >= Decimal::ZERO) {
        return Err(BackendError::rejected(INVALID_STOPS, "invalid stops"));
    }
    if take_profit.is_some_and(|tp| side.favorable_move(reference, tp) <= Decimal::ZERO) {
        return Err(BackendError::rejected(INVALID_STOPS, "invalid stops"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn tick(bid: Decimal, sec: u32) -> Quote {
        Quote::new(
            Symbol::new("EURUSD"),
            bid,
            bid + dec!(0.00010),
            Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, sec).unwrap(),
        )
    }

    fn request(side: Side, order_type: OrderType, price: Option<Decimal>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: Symbol::new("EURUSD"),
            side,
            order_type,
            volume: dec!(1),
            price,
            stop_loss: None,
            take_profit: None,
            expiration: None,
            deviation_points: 0,
            magic: 0,
            comment: None,
        }
    }

    #[test]
    fn buy_stop_fills_when_ask_reaches_trigger() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let ticket = book
            .place(request(Side::Buy, OrderType::Stop, Some(dec!(1.10100))))
            .unwrap();

        assert!(book.apply_tick(&tick(dec!(1.10050), 1)).is_empty());
        let events = book.apply_tick(&tick(dec!(1.10090), 2));

        assert_eq!(
            events,
            vec![BookEvent::Filled {
                ticket,
                price: dec!(1.10100)
            }]
        );
        assert!(!book.get(ticket).unwrap().is_pending());
    }

    #[test]
    fn stop_loss_settles_position() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let mut buy = request(Side::Buy, OrderType::Market, None);
        buy.stop_loss = Some(dec!(1.09900));
        let ticket = book.place(buy).unwrap();

        let events = book.apply_tick(&tick(dec!(1.09890), 1));

        assert!(matches!(events[..], [BookEvent::StoppedOut { .. }]));
        assert!(book.get(ticket).is_none());
        // Bought at 1.10010, sold at 1.09890: 0.00120 * 100000
        assert_eq!(book.account().balance, dec!(9880));
    }

    #[test]
    fn stops_on_wrong_side_are_rejected() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let mut buy = request(Side::Buy, OrderType::Market, None);
        buy.stop_loss = Some(dec!(1.10500));

        assert_eq!(
            book.place(buy),
            Err(BackendError::rejected(INVALID_STOPS, "invalid stops"))
        );
    }

    #[test]
    fn unknown_ticket() {
        let mut book = OrderBook::new(dec!(0));
        assert!(matches!(
            book.close(Ticket::new(1), None),
            Err(BackendError::Rejected { code: INVALID_TICKET, .. })
        ));
    }

    #[test]
    fn delete_only_touches_pending_orders() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let pending = book
            .place(request(Side::Buy, OrderType::Stop, Some(dec!(1.10100))))
            .unwrap();
        let position = book.place(request(Side::Buy, OrderType::Market, None)).unwrap();

        assert!(matches!(
            book.delete(position),
            Err(BackendError::Rejected { code: INVALID_TICKET, .. })
        ));
        assert!(matches!(
            book.close(pending, None),
            Err(BackendError::Rejected { code: INVALID_TICKET, .. })
        ));
        assert!(book.get(position).is_some());

        book.delete(pending).unwrap();
        assert!(book.get(pending).is_none());
        assert_eq!(book.account().balance, dec!(10000));
    }

    #[test]
    fn filled_stop_can_no_longer_be_deleted() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let ticket = book
            .place(request(Side::Buy, OrderType::Stop, Some(dec!(1.10100))))
            .unwrap();
        book.apply_tick(&tick(dec!(1.10090), 1));

        assert!(book.delete(ticket).is_err());
        assert!(!book.get(ticket).unwrap().is_pending());
    }

    #[test]
    fn partial_close_keeps_remainder() {
        let mut book = OrderBook::new(dec!(10000));
        book.set_quote(tick(dec!(1.10000), 0));
        let ticket = book.place(request(Side::Buy, OrderType::Market, None)).unwrap();

        book.close(ticket, Some(dec!(0.4))).unwrap();

        assert_eq!(book.get(ticket).unwrap().volume, dec!(0.6));
    }
}
