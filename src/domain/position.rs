//! Single long position held by the cash ledger.

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub quantity: i64,
    pub entry_price: f64,
    /// Entry notional plus entry commission of the quantity still held.
    pub cost_basis: f64,
}

impl Position {
    pub fn open(quantity: i64, entry_price: f64, commission: f64) -> Self {
        Position {
            quantity,
            entry_price,
            cost_basis: quantity as f64 * entry_price + commission,
        }
    }

    /// Add to the position at `price`, averaging the entry price.
    pub fn add(&mut self, quantity: i64, price: f64, commission: f64) {
        let total = self.quantity + quantity;
        if total > 0 {
            self.entry_price =
                (self.entry_price * self.quantity as f64 + price * quantity as f64) / total as f64;
        }
        self.quantity = total;
        self.cost_basis += quantity as f64 * price + commission;
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.market_value(price) - self.cost_basis
    }

    /// Remove `quantity` from the position and return the cost basis released.
    pub fn reduce(&mut self, quantity: i64) -> f64 {
        let quantity = quantity.clamp(0, self.quantity);
        if quantity == 0 {
            return 0.0;
        }
        let released = self.cost_basis * quantity as f64 / self.quantity as f64;
        self.quantity -= quantity;
        self.cost_basis -= released;
        if self.quantity == 0 {
            self.cost_basis = 0.0;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_includes_commission_in_basis() {
        let pos = Position::open(100, 10.0, 1.0);
        assert!((pos.cost_basis - 1001.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(10.0) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reduce_releases_proportional_basis() {
        let mut pos = Position::open(200, 10.0, 2.0);
        let released = pos.reduce(100);
        assert!((released - 1001.0).abs() < 1e-9);
        assert_eq!(pos.quantity, 100);
        assert!((pos.cost_basis - 1001.0).abs() < 1e-9);
    }

    #[test]
    fn add_averages_entry_price() {
        let mut pos = Position::open(100, 10.0, 0.0);
        pos.add(100, 20.0, 0.0);
        assert_eq!(pos.quantity, 200);
        assert!((pos.entry_price - 15.0).abs() < f64::EPSILON);
        assert!((pos.cost_basis - 3000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reduce_is_capped_at_held_quantity() {
        let mut pos = Position::open(100, 10.0, 0.0);
        let released = pos.reduce(500);
        assert!((released - 1000.0).abs() < f64::EPSILON);
        assert!(pos.is_flat());
        assert!((pos.cost_basis - 0.0).abs() < f64::EPSILON);
    }
}
