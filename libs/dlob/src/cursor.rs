//! Pull cursor over a best-first sequence of resting orders
//!
//! The merge has to look at the next order's price before deciding whether
//! the curve or the book supplies the next unit, so the cursor keeps one
//! resolved order in a lookahead slot and only drops it once fully consumed.

use perpsim_types::{
    OraclePriceData, OwnerId, PositionDirection, RestingOrder, SimResult, SimulationError,
};
use std::collections::HashSet;
use tracing::trace;

/// Resolved view of the order at the head of the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLevel {
    pub order_id: u32,
    pub owner: OwnerId,
    /// Limit price against the cursor's oracle sample, `PRICE_PRECISION`
    pub price: u128,
    /// Base still available to this walk
    pub remaining: u128,
}

/// Cursor over the side of the book a taker in `taker_direction` consumes
///
/// A long taker walks asks, which must be non-decreasing in price; a short
/// taker walks bids, which must be non-increasing.
pub struct OrderCursor<'a, I>
where
    I: Iterator<Item = RestingOrder>,
{
    orders: I,
    excluded: &'a HashSet<OwnerId>,
    oracle: &'a OraclePriceData,
    taker_direction: PositionDirection,
    last_price: Option<u128>,
    head: Option<OrderLevel>,
}

impl<'a, I> OrderCursor<'a, I>
where
    I: Iterator<Item = RestingOrder>,
{
    pub fn new<S>(
        orders: S,
        taker_direction: PositionDirection,
        oracle: &'a OraclePriceData,
        excluded: &'a HashSet<OwnerId>,
    ) -> Self
    where
        S: IntoIterator<Item = RestingOrder, IntoIter = I>,
    {
        Self {
            orders: orders.into_iter(),
            excluded,
            oracle,
            taker_direction,
            last_price: None,
            head: None,
        }
    }

    /// Next order with size available to this taker, without consuming it
    ///
    /// Excluded owners and exhausted orders are skipped, but still checked
    /// for price priority.
    pub fn peek(&mut self) -> SimResult<Option<OrderLevel>> {
        if self.head.is_none() {
            self.head = self.pull()?;
        }
        Ok(self.head)
    }

    /// Take `base_asset_amount` from the head order
    pub fn consume(&mut self, base_asset_amount: u128) -> SimResult<()> {
        let head = self.head.as_mut().ok_or_else(|| {
            SimulationError::invariant("consumed from an empty order cursor")
        })?;
        if base_asset_amount > head.remaining {
            return Err(SimulationError::invariant(format!(
                "consumed {} from order {} with only {} remaining",
                base_asset_amount, head.order_id, head.remaining
            )));
        }

        head.remaining -= base_asset_amount;
        if head.remaining == 0 {
            self.advance();
        }
        Ok(())
    }

    /// Drop the head order regardless of what is left on it
    pub fn advance(&mut self) {
        self.head = None;
    }

    fn pull(&mut self) -> SimResult<Option<OrderLevel>> {
        let maker_side = self.taker_direction.opposite();

        for order in self.orders.by_ref() {
            if order.side != maker_side {
                return Err(SimulationError::invalid_argument(format!(
                    "order {} is a {} order on the {} side of the book",
                    order.order_id, order.side, maker_side
                )));
            }

            let price = order.limit_price(self.oracle)?;
            if let Some(previous) = self.last_price {
                let out_of_priority = match self.taker_direction {
                    PositionDirection::Long => price < previous,
                    PositionDirection::Short => price > previous,
                };
                if out_of_priority {
                    return Err(SimulationError::UnsortedOrders {
                        previous,
                        next: price,
                    });
                }
            }
            self.last_price = Some(price);

            if self.excluded.contains(&order.owner) {
                trace!(order_id = order.order_id, owner = %order.owner, "skipping excluded owner");
                continue;
            }
            let remaining = order.remaining();
            if remaining == 0 {
                trace!(order_id = order.order_id, "skipping filled order");
                continue;
            }

            return Ok(Some(OrderLevel {
                order_id: order.order_id,
                owner: order.owner,
                price,
                remaining,
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::fixtures::{ask, bid, maker, oracle_at};
    use perpsim_types::{OrderPrice, PRICE_PRECISION};

    const COIN: u128 = perpsim_types::BASE_PRECISION;

    fn cents(cents: u128) -> u128 {
        cents * PRICE_PRECISION / 100
    }

    #[test]
    fn test_skips_excluded_and_filled_orders() {
        let oracle = oracle_at(PRICE_PRECISION);
        let mut filled = ask(2, cents(101), COIN);
        filled.base_asset_amount_filled = COIN;
        let orders = vec![ask(1, cents(100), COIN), filled, ask(3, cents(102), 2 * COIN)];
        let excluded = HashSet::from([maker(1)]);

        let mut cursor = OrderCursor::new(orders, PositionDirection::Long, &oracle, &excluded);
        let head = cursor.peek().unwrap().unwrap();
        assert_eq!(head.order_id, 3);
        assert_eq!(head.price, cents(102));
        assert_eq!(head.remaining, 2 * COIN);
    }

    #[test]
    fn test_partial_consume_keeps_head() {
        let oracle = oracle_at(PRICE_PRECISION);
        let excluded = HashSet::new();
        let orders = vec![bid(1, cents(99), 3 * COIN), bid(2, cents(98), COIN)];
        let mut cursor = OrderCursor::new(orders, PositionDirection::Short, &oracle, &excluded);

        cursor.peek().unwrap();
        cursor.consume(COIN).unwrap();
        assert_eq!(cursor.peek().unwrap().unwrap().remaining, 2 * COIN);

        cursor.consume(2 * COIN).unwrap();
        assert_eq!(cursor.peek().unwrap().unwrap().order_id, 2);

        cursor.consume(COIN).unwrap();
        assert_eq!(cursor.peek().unwrap(), None);
    }

    #[test]
    fn test_rejects_out_of_priority_orders() {
        let oracle = oracle_at(PRICE_PRECISION);
        let excluded = HashSet::new();
        let orders = vec![ask(1, cents(102), COIN), ask(2, cents(101), COIN)];
        let mut cursor = OrderCursor::new(orders, PositionDirection::Long, &oracle, &excluded);

        cursor.peek().unwrap();
        cursor.consume(COIN).unwrap();
        assert_eq!(
            cursor.peek(),
            Err(SimulationError::UnsortedOrders {
                previous: cents(102),
                next: cents(101),
            })
        );
    }

    #[test]
    fn test_priority_checked_through_excluded_orders() {
        let oracle = oracle_at(PRICE_PRECISION);
        let excluded = HashSet::from([maker(1)]);
        let orders = vec![bid(1, cents(97), COIN), bid(2, cents(98), COIN)];
        let mut cursor = OrderCursor::new(orders, PositionDirection::Short, &oracle, &excluded);

        assert!(matches!(cursor.peek(), Err(SimulationError::UnsortedOrders { .. })));
    }

    #[test]
    fn test_rejects_wrong_side() {
        let oracle = oracle_at(PRICE_PRECISION);
        let excluded = HashSet::new();
        let mut cursor =
            OrderCursor::new(vec![bid(1, cents(99), COIN)], PositionDirection::Long, &oracle, &excluded);

        assert!(matches!(cursor.peek(), Err(SimulationError::InvalidArgument { .. })));
    }

    #[test]
    fn test_oracle_offset_orders_priced_against_sample() {
        let oracle = oracle_at(cents(150));
        let excluded = HashSet::new();
        let mut floating = ask(1, 0, COIN);
        floating.price = OrderPrice::OracleOffset(cents(2) as i128);

        let mut cursor = OrderCursor::new(vec![floating], PositionDirection::Long, &oracle, &excluded);
        assert_eq!(cursor.peek().unwrap().unwrap().price, cents(152));
    }

    #[test]
    fn test_overconsume_is_invariant_violation() {
        let oracle = oracle_at(PRICE_PRECISION);
        let excluded = HashSet::new();
        let mut cursor =
            OrderCursor::new(vec![ask(1, cents(101), COIN)], PositionDirection::Long, &oracle, &excluded);

        assert!(matches!(cursor.consume(1), Err(SimulationError::InvariantViolation { .. })));
        cursor.peek().unwrap();
        assert!(matches!(
            cursor.consume(COIN + 1),
            Err(SimulationError::InvariantViolation { .. })
        ));
    }
}
