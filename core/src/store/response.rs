use super::{bad_label, clear_run, PipelineStore};
use crate::{
    aggregate::{AggregatedRow, CategoryStats},
    clustering::LabeledRow,
    error::PipelineResult,
    profile::{Customer, Gender},
    response::ResponseRecord,
};
use rusqlite::{params, Connection, Row};

const AGG_COLUMNS: &str = "customer_id,
    response_sum_bogo, resp_number_mean_bogo, resp_amount_mean_bogo, resp_reward_mean_bogo,
    difficulty_mean_bogo, duration_mean_bogo, reward_mean_bogo,
    response_sum_discount, resp_number_mean_discount, resp_amount_mean_discount,
    resp_reward_mean_discount, difficulty_mean_discount, duration_mean_discount,
    reward_mean_discount,
    gender, age, age_band, income, income_band, reg_year, reg_month";

fn stats_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<CategoryStats> {
    Ok(CategoryStats {
        response_sum:      row.get::<_, i64>(start)? as u32,
        valid_count_mean:  row.get(start + 1)?,
        amount_mean:       row.get(start + 2)?,
        reward_mean:       row.get(start + 3)?,
        difficulty_mean:   row.get(start + 4)?,
        duration_mean:     row.get(start + 5)?,
        offer_reward_mean: row.get(start + 6)?,
    })
}

/// Reads the 22 aggregate columns starting at column `start`.
fn aggregated_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<AggregatedRow> {
    let customer_id = row.get::<_, i64>(start)? as u64;
    let code: String = row.get(start + 15)?;
    Ok(AggregatedRow {
        customer_id,
        bogo:     stats_from_row(row, start + 1)?,
        discount: stats_from_row(row, start + 8)?,
        profile:  Customer {
            customer_id,
            gender: Gender::from_code(&code)
                .ok_or_else(|| bad_label(start + 15, "gender", &code))?,
            age:                row.get::<_, i64>(start + 16)? as u32,
            age_band:           row.get(start + 17)?,
            income:             row.get(start + 18)?,
            income_band:        row.get(start + 19)?,
            registration_year:  row.get::<_, i64>(start + 20)? as i32,
            registration_month: row.get::<_, i64>(start + 21)? as u32,
        },
    })
}

impl PipelineStore {
    /// Combine-stage output in one transaction. Replaces the run's responses
    /// and aggregate, and drops labels fitted on the previous aggregate.
    pub fn save_combined(
        &self,
        run_id: &str,
        responses: &[ResponseRecord],
        rows: &[AggregatedRow],
    ) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        clear_run(&tx, "response_labeled", run_id)?;
        write_responses(&tx, run_id, responses)?;
        write_aggregated(&tx, run_id, rows)?;
        tx.commit()?;
        Ok(())
    }

    // ── Responses ─────────────────────────────────────────────────

    pub fn save_responses(&self, run_id: &str, records: &[ResponseRecord]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_responses(&tx, run_id, records)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_responses(&self, run_id: &str) -> PipelineResult<Vec<ResponseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, offer_id, response, resp_number, resp_amount, resp_reward
             FROM response WHERE run_id = ?1 ORDER BY customer_id ASC, offer_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(ResponseRecord {
                customer_id:       row.get::<_, i64>(0)? as u64,
                offer_id:          row.get::<_, i64>(1)? as u64,
                is_valid_response: row.get::<_, i64>(2)? != 0,
                valid_count:       row.get::<_, i64>(3)? as u32,
                attributed_amount: row.get(4)?,
                attributed_reward: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Aggregated response ───────────────────────────────────────

    pub fn save_aggregated(&self, run_id: &str, rows: &[AggregatedRow]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_aggregated(&tx, run_id, rows)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_aggregated(&self, run_id: &str) -> PipelineResult<Vec<AggregatedRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AGG_COLUMNS} FROM response_agg WHERE run_id = ?1 ORDER BY customer_id ASC"
        ))?;
        let rows = stmt.query_map(params![run_id], |row| aggregated_from_row(row, 0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Labeled response ──────────────────────────────────────────

    pub fn save_labels(&self, run_id: &str, rows: &[LabeledRow]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_labels(&tx, run_id, rows)?;
        tx.commit()?;
        Ok(())
    }

    /// Aggregated rows joined with their cluster label.
    pub fn load_labeled(&self, run_id: &str) -> PipelineResult<Vec<LabeledRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.cluster,
                    a.customer_id,
                    a.response_sum_bogo, a.resp_number_mean_bogo, a.resp_amount_mean_bogo,
                    a.resp_reward_mean_bogo, a.difficulty_mean_bogo, a.duration_mean_bogo,
                    a.reward_mean_bogo,
                    a.response_sum_discount, a.resp_number_mean_discount,
                    a.resp_amount_mean_discount, a.resp_reward_mean_discount,
                    a.difficulty_mean_discount, a.duration_mean_discount, a.reward_mean_discount,
                    a.gender, a.age, a.age_band, a.income, a.income_band, a.reg_year, a.reg_month
             FROM response_labeled l
             JOIN response_agg a ON a.run_id = l.run_id AND a.customer_id = l.customer_id
             WHERE l.run_id = ?1
             ORDER BY l.customer_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(LabeledRow {
                cluster: row.get::<_, i64>(0)? as usize,
                row:     aggregated_from_row(row, 1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn write_responses(conn: &Connection, run_id: &str, records: &[ResponseRecord]) -> rusqlite::Result<()> {
    clear_run(conn, "response", run_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO response (
            run_id, customer_id, offer_id, response, resp_number, resp_amount, resp_reward
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for r in records {
        stmt.execute(params![
            run_id,
            r.customer_id as i64,
            r.offer_id as i64,
            if r.is_valid_response { 1i64 } else { 0i64 },
            r.valid_count as i64,
            r.attributed_amount,
            r.attributed_reward,
        ])?;
    }
    Ok(())
}

fn write_aggregated(conn: &Connection, run_id: &str, rows: &[AggregatedRow]) -> rusqlite::Result<()> {
    clear_run(conn, "response_agg", run_id)?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO response_agg (run_id, {AGG_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
    ))?;
    for r in rows {
        let b = &r.bogo;
        let d = &r.discount;
        let p = &r.profile;
        stmt.execute(params![
            run_id,
            r.customer_id as i64,
            b.response_sum as i64,
            b.valid_count_mean,
            b.amount_mean,
            b.reward_mean,
            b.difficulty_mean,
            b.duration_mean,
            b.offer_reward_mean,
            d.response_sum as i64,
            d.valid_count_mean,
            d.amount_mean,
            d.reward_mean,
            d.difficulty_mean,
            d.duration_mean,
            d.offer_reward_mean,
            p.gender.code(),
            p.age as i64,
            &p.age_band,
            p.income,
            &p.income_band,
            p.registration_year as i64,
            p.registration_month as i64,
        ])?;
    }
    Ok(())
}

fn write_labels(conn: &Connection, run_id: &str, rows: &[LabeledRow]) -> rusqlite::Result<()> {
    clear_run(conn, "response_labeled", run_id)?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO response_labeled (run_id, customer_id, cluster) VALUES (?1, ?2, ?3)",
    )?;
    for r in rows {
        stmt.execute(params![run_id, r.row.customer_id as i64, r.cluster as i64])?;
    }
    Ok(())
}
