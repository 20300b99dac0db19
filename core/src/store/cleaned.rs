use super::{bad_label, clear_run, PipelineStore};
use crate::{
    error::PipelineResult,
    event::{Event, EventKind},
    portfolio::{Offer, OfferCategory},
    profile::{Customer, Gender},
};
use rusqlite::{params, Connection};

impl PipelineStore {
    /// Clean-stage output in one transaction. Replaces whatever the run held
    /// in the cleaned tables and drops everything derived from them.
    pub fn save_cleaned(
        &self,
        run_id: &str,
        offers: &[Offer],
        customers: &[Customer],
        events: &[Event],
    ) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for table in ["response_labeled", "response_agg", "response"] {
            clear_run(&tx, table, run_id)?;
        }
        write_offers(&tx, run_id, offers)?;
        write_customers(&tx, run_id, customers)?;
        write_events(&tx, run_id, events)?;
        tx.commit()?;
        Ok(())
    }

    // ── Offers ────────────────────────────────────────────────────

    pub fn save_offers(&self, run_id: &str, offers: &[Offer]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_offers(&tx, run_id, offers)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_offers(&self, run_id: &str) -> PipelineResult<Vec<Offer>> {
        let mut stmt = self.conn.prepare(
            "SELECT offer_id, offer_type, difficulty, duration, reward,
                    channel_email, channel_mobile, channel_social, channel_web
             FROM offer WHERE run_id = ?1 ORDER BY offer_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let label: String = row.get(1)?;
            Ok(Offer {
                offer_id:       row.get::<_, i64>(0)? as u64,
                category:       OfferCategory::parse(&label)
                    .ok_or_else(|| bad_label(1, "offer_type", &label))?,
                difficulty:     row.get(2)?,
                duration:       row.get(3)?,
                reward:         row.get(4)?,
                channel_email:  row.get::<_, i64>(5)? != 0,
                channel_mobile: row.get::<_, i64>(6)? != 0,
                channel_social: row.get::<_, i64>(7)? != 0,
                channel_web:    row.get::<_, i64>(8)? != 0,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Customers ─────────────────────────────────────────────────

    pub fn save_customers(&self, run_id: &str, customers: &[Customer]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_customers(&tx, run_id, customers)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_customers(&self, run_id: &str) -> PipelineResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, gender, age, age_band, income, income_band, reg_year, reg_month
             FROM customer WHERE run_id = ?1 ORDER BY customer_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let code: String = row.get(1)?;
            Ok(Customer {
                customer_id:        row.get::<_, i64>(0)? as u64,
                gender:             Gender::from_code(&code)
                    .ok_or_else(|| bad_label(1, "gender", &code))?,
                age:                row.get::<_, i64>(2)? as u32,
                age_band:           row.get(3)?,
                income:             row.get(4)?,
                income_band:        row.get(5)?,
                registration_year:  row.get::<_, i64>(6)? as i32,
                registration_month: row.get::<_, i64>(7)? as u32,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Events ────────────────────────────────────────────────────

    pub fn save_events(&self, run_id: &str, events: &[Event]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_events(&tx, run_id, events)?;
        tx.commit()?;
        Ok(())
    }

    /// Events in transcript order.
    pub fn load_events(&self, run_id: &str) -> PipelineResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, event, event_amount, event_reward, time, customer_id, offer_id
             FROM event WHERE run_id = ?1 ORDER BY event_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let label: String = row.get(1)?;
            Ok(Event {
                event_id:    row.get::<_, i64>(0)? as u64,
                kind:        EventKind::from_label(&label)
                    .ok_or_else(|| bad_label(1, "event", &label))?,
                amount:      row.get(2)?,
                reward:      row.get(3)?,
                timestamp:   row.get(4)?,
                customer_id: row.get::<_, i64>(5)? as u64,
                offer_id:    row.get::<_, i64>(6)? as u64,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn write_offers(conn: &Connection, run_id: &str, offers: &[Offer]) -> rusqlite::Result<()> {
    clear_run(conn, "offer", run_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO offer (
            run_id, offer_id, offer_type, difficulty, duration, reward,
            channel_email, channel_mobile, channel_social, channel_web
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for o in offers {
        stmt.execute(params![
            run_id,
            o.offer_id as i64,
            o.category.as_str(),
            o.difficulty,
            o.duration,
            o.reward,
            if o.channel_email { 1i64 } else { 0i64 },
            if o.channel_mobile { 1i64 } else { 0i64 },
            if o.channel_social { 1i64 } else { 0i64 },
            if o.channel_web { 1i64 } else { 0i64 },
        ])?;
    }
    Ok(())
}

fn write_customers(conn: &Connection, run_id: &str, customers: &[Customer]) -> rusqlite::Result<()> {
    clear_run(conn, "customer", run_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO customer (
            run_id, customer_id, gender, age, age_band, income, income_band,
            reg_year, reg_month
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for c in customers {
        stmt.execute(params![
            run_id,
            c.customer_id as i64,
            c.gender.code(),
            c.age as i64,
            &c.age_band,
            c.income,
            &c.income_band,
            c.registration_year as i64,
            c.registration_month as i64,
        ])?;
    }
    Ok(())
}

fn write_events(conn: &Connection, run_id: &str, events: &[Event]) -> rusqlite::Result<()> {
    clear_run(conn, "event", run_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO event (
            run_id, event_id, event, event_amount, event_reward, time,
            customer_id, offer_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for e in events {
        stmt.execute(params![
            run_id,
            e.event_id as i64,
            e.kind.label(),
            e.amount,
            e.reward,
            e.timestamp,
            e.customer_id as i64,
            e.offer_id as i64,
        ])?;
    }
    Ok(())
}
