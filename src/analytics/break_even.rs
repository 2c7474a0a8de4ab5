use super::{fetch_rows, month_end, month_key, month_of, number, previous_month_start, DashboardTables};
use crate::db::TursoClient;
use crate::types::{
    BreakEvenFigures, BreakEvenResponse, CostType, LedgerEntry, MonthlyBreakEven, Result,
};
use crate::warehouse::Warehouse;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Months returned by the monthly break-even when none are requested.
pub const DEFAULT_MONTHS: usize = 12;

/// Revenue needed to cover `fixed` costs given the variable cost ratio.
/// With no revenue the fixed costs themselves are the break-even point.
pub fn break_even_point(fixed: f64, variable: f64, revenue: f64) -> f64 {
    if revenue == 0.0 {
        return fixed;
    }
    let point = fixed / (1.0 - variable / revenue);
    if point.is_finite() {
        point
    } else {
        0.0
    }
}

/// Sum ledger entries into break-even figures.
pub fn figures(costs: &[LedgerEntry], revenues: &[LedgerEntry]) -> BreakEvenFigures {
    let sum_costs = |cost_type: CostType| {
        costs
            .iter()
            .filter(|c| c.cost_type == Some(cost_type))
            .map(|c| c.amount)
            .sum::<f64>()
    };
    let fixed_costs = sum_costs(CostType::Fixed);
    let variable_costs = sum_costs(CostType::Variable);
    let revenue = revenues.iter().map(|r| r.amount).sum();

    BreakEvenFigures {
        fixed_costs,
        variable_costs,
        revenue,
        break_even_point: break_even_point(fixed_costs, variable_costs, revenue),
    }
}

/// Next month's figures assuming revenue keeps growing at the current rate.
/// Returns the projection and the growth rate used.
pub fn project(current: &BreakEvenFigures, last: &BreakEvenFigures) -> (BreakEvenFigures, f64) {
    let growth = if last.revenue == 0.0 {
        1.0
    } else {
        current.revenue / last.revenue
    };

    let revenue = current.revenue * growth;
    let variable_costs = current.variable_costs * growth;
    let fixed_costs = current.fixed_costs;

    (
        BreakEvenFigures {
            fixed_costs,
            variable_costs,
            revenue,
            break_even_point: break_even_point(fixed_costs, variable_costs, revenue),
        },
        growth,
    )
}

/// Break-even of the current and previous calendar month from the ledger,
/// plus a projection for next month.
pub async fn ledger_break_even(
    turso: &TursoClient,
    restaurant_id: &str,
    today: NaiveDate,
) -> Result<BreakEvenResponse> {
    let from = previous_month_start(today).format("%Y-%m-%d").to_string();
    let to = month_end(today).format("%Y-%m-%d").to_string();

    let costs = turso.list_costs(restaurant_id, &from, &to).await?;
    let revenues = turso.list_revenues(restaurant_id, &from, &to).await?;

    let current_key = month_key(today);
    let in_month = |entries: &[LedgerEntry], current: bool| -> Vec<LedgerEntry> {
        entries
            .iter()
            .filter(|e| e.date.starts_with(&current_key) == current)
            .cloned()
            .collect()
    };

    let current_month = figures(&in_month(&costs, true), &in_month(&revenues, true));
    let last_month = figures(&in_month(&costs, false), &in_month(&revenues, false));
    let (projection, growth_rate) = project(&current_month, &last_month);

    Ok(BreakEvenResponse {
        current_month,
        last_month,
        projection,
        growth_rate,
    })
}

// ============= Monthly break-even =============

#[derive(Debug, Default, Clone, Copy)]
struct MonthTotals {
    revenue: f64,
    variable: f64,
    fixed: f64,
}

impl MonthTotals {
    fn into_break_even(self, month: String) -> MonthlyBreakEven {
        let margin = self.revenue - self.variable;
        let contribution_margin_ratio = (margin != 0.0).then(|| self.fixed / margin);
        let break_even_revenue = if self.revenue != 0.0 {
            let denominator = 1.0 - self.variable / self.revenue;
            (denominator != 0.0).then(|| self.fixed / denominator)
        } else {
            None
        };

        MonthlyBreakEven {
            month,
            total_revenue: self.revenue,
            variable_costs: self.variable,
            fixed_costs: self.fixed,
            contribution_margin_ratio,
            break_even_revenue,
        }
    }
}

/// Per-month break-even from the dashboard tables, newest month first,
/// at most `months` entries.
pub async fn monthly_break_even(
    warehouse: &dyn Warehouse,
    tables: &DashboardTables,
    restaurant_id: &str,
    months: usize,
) -> Result<Vec<MonthlyBreakEven>> {
    let stock = fetch_rows(
        warehouse,
        &tables.stock,
        &[super::DATE_COLUMN, "qtd_usada_unidades", "custo_unitario_brl"],
        restaurant_id,
        None,
    )
    .await?;
    let integrated = fetch_rows(
        warehouse,
        &tables.integrated,
        &[
            super::DATE_COLUMN,
            "vendas_brutas_brl",
            "custo_alimentos_brl",
            "custo_mao_obra_brl",
            "despesa_promocional_brl",
        ],
        restaurant_id,
        None,
    )
    .await?;
    let delivery = fetch_rows(
        warehouse,
        &tables.delivery,
        &[super::DATE_COLUMN, "total_brl"],
        restaurant_id,
        None,
    )
    .await?;

    let mut totals: BTreeMap<String, MonthTotals> = BTreeMap::new();

    for row in &stock {
        if let Some(month) = month_of(row.get(super::DATE_COLUMN)) {
            totals.entry(month).or_default().variable +=
                number(row.get("qtd_usada_unidades")) * number(row.get("custo_unitario_brl"));
        }
    }

    for row in &integrated {
        if let Some(month) = month_of(row.get(super::DATE_COLUMN)) {
            let entry = totals.entry(month).or_default();
            entry.revenue += number(row.get("vendas_brutas_brl"));
            entry.variable += number(row.get("custo_alimentos_brl"));
            entry.fixed += number(row.get("custo_mao_obra_brl"))
                + number(row.get("despesa_promocional_brl"));
        }
    }

    for row in &delivery {
        if let Some(month) = month_of(row.get(super::DATE_COLUMN)) {
            totals.entry(month).or_default().revenue += number(row.get("total_brl"));
        }
    }

    Ok(totals
        .into_iter()
        .rev()
        .take(months)
        .map(|(month, t)| t.into_break_even(month))
        .collect())
}
