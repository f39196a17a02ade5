//! HTML page for one dashboard view.

use std::fmt::Write as _;

use serde_json::{Value as Json, json};

use crate::dashboard::model::{CountryShare, DashboardView, params};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const STYLE: &str = "
body { background: #0e1117; color: #e6edf3; font-family: sans-serif; margin: 0; }
main { padding: 1.5rem 2rem; }
form { display: flex; gap: 1rem; align-items: flex-end; flex-wrap: wrap; }
select { background: #161b22; color: #e6edf3; border: 1px solid #30363d; min-width: 10rem; }
.metrics { display: grid; grid-template-columns: repeat(4, 1fr); gap: 1rem; margin: 1.5rem 0; }
.metric { background: #161b22; padding: 15px; border-radius: 10px; border: 1px solid #30363d; }
.metric .value { font-size: 1.8rem; }
.pair { display: grid; grid-template-columns: 1fr 1fr; gap: 1rem; }
.detail { max-height: 30rem; overflow: auto; border: 1px solid #30363d; }
table { border-collapse: collapse; font-size: 0.85rem; }
th, td { padding: 0.25rem 0.5rem; border-bottom: 1px solid #30363d; white-space: nowrap; }
th { position: sticky; top: 0; background: #161b22; }
";

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// JSON that is safe inside a `<script>` element.
fn script_json(value: &Json) -> String {
    value.to_string().replace("</", "<\\/")
}

pub fn render_page(title: &str, view: &DashboardView) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <script src=\"{PLOTLY_CDN}\"></script><style>{STYLE}</style></head><body><main>",
        title = escape_html(title)
    );
    let _ = write!(html, "<h1>{}</h1>", escape_html(title));
    html.push_str(&filter_form(view));
    html.push_str(&metric_tiles(view));

    html.push_str("<h2>Orders per month</h2><div id=\"monthly\"></div>");
    html.push_str(
        "<div class=\"pair\"><div><h2>Delivered by country</h2><div id=\"delivered\"></div></div>\
         <div><h2>Undelivered by country</h2><div id=\"undelivered\"></div></div></div>",
    );
    html.push_str("<h2>Month, employee and customer</h2><div id=\"scatter\"></div>");
    html.push_str("<h2>Order lines</h2>");
    html.push_str(&detail_table(view));

    let _ = write!(
        html,
        "<script>const charts = {};\
         const config = {{displayModeBar: true, responsive: true, scrollZoom: false}};\
         for (const [id, chart] of Object.entries(charts)) {{\
         Plotly.newPlot(id, chart.data, chart.layout, config); }}</script>",
        script_json(&charts(view))
    );
    html.push_str("</main></body></html>");
    html
}

fn filter_form(view: &DashboardView) -> String {
    let filters = &view.filters;
    let years = view
        .options
        .years
        .iter()
        .map(|year| option(&year.to_string(), filters.year_selected(*year)))
        .collect::<String>();
    let employees = view
        .options
        .employees
        .iter()
        .map(|e| option(e, filters.employee_selected(e)))
        .collect::<String>();
    let customers = view
        .options
        .customers
        .iter()
        .map(|c| option(c, filters.customer_selected(c)))
        .collect::<String>();
    format!(
        "<form method=\"get\"><input type=\"hidden\" name=\"{applied}\" value=\"1\">\
         <label>Years<br><select name=\"{year}\" multiple size=\"6\">{years}</select></label>\
         <label>Employees<br><select name=\"{employee}\" multiple size=\"6\">{employees}</select></label>\
         <label>Customers<br><select name=\"{customer}\" multiple size=\"6\">{customers}</select></label>\
         <button type=\"submit\">Apply</button></form>",
        applied = params::APPLIED,
        year = params::YEAR,
        employee = params::EMPLOYEE,
        customer = params::CUSTOMER,
    )
}

fn option(value: &str, selected: bool) -> String {
    let value = escape_html(value);
    let selected = if selected { " selected" } else { "" };
    format!("<option value=\"{value}\"{selected}>{value}</option>")
}

fn metric_tiles(view: &DashboardView) -> String {
    let kpis = &view.kpis;
    let tiles = [
        ("Total orders", kpis.total_orders.to_string()),
        ("Delivered", kpis.delivered.to_string()),
        ("Undelivered", kpis.undelivered.to_string()),
        ("Delivery rate", format!("{:.2}%", kpis.delivery_rate)),
    ];
    let body = tiles
        .iter()
        .map(|(label, value)| {
            format!(
                "<div class=\"metric\"><div>{label}</div><div class=\"value\">{}</div></div>",
                escape_html(value)
            )
        })
        .collect::<String>();
    format!("<div class=\"metrics\">{body}</div>")
}

fn detail_table(view: &DashboardView) -> String {
    let mut html = String::from("<div class=\"detail\"><table><thead><tr>");
    for header in &view.detail.headers {
        let _ = write!(html, "<th>{}</th>", escape_html(header));
    }
    html.push_str("</tr></thead><tbody>");
    for row in &view.detail.rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape_html(cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table></div>");
    html
}

fn dark_layout(extra: Json) -> Json {
    let mut layout = json!({
        "plot_bgcolor": "rgba(0,0,0,0)",
        "paper_bgcolor": "rgba(0,0,0,0)",
        "font": {"color": "white"},
    });
    if let (Some(base), Json::Object(extra)) = (layout.as_object_mut(), extra) {
        base.extend(extra);
    }
    layout
}

fn donut(shares: &[CountryShare]) -> Json {
    json!({
        "data": [{
            "type": "pie",
            "hole": 0.6,
            "labels": shares.iter().map(|s| s.country.as_str()).collect::<Vec<_>>(),
            "values": shares.iter().map(|s| s.orders).collect::<Vec<_>>(),
            "text": shares
                .iter()
                .map(|s| format!("{:.1}%", s.share * 100.0))
                .collect::<Vec<_>>(),
            "textinfo": "label+text",
            "hoverinfo": "label+value+text",
        }],
        "layout": dark_layout(json!({})),
    })
}

/// Plotly figures keyed by the id of the element they render into.
pub fn charts(view: &DashboardView) -> Json {
    let monthly = json!({
        "data": [{
            "type": "scatter",
            "mode": "lines+markers",
            "x": view.monthly.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "y": view.monthly.iter().map(|m| m.orders).collect::<Vec<_>>(),
            "line": {"color": "#58a6ff"},
        }],
        "layout": dark_layout(json!({"yaxis": {"title": {"text": "Orders"}}})),
    });

    let max_total = view
        .scatter
        .iter()
        .map(|p| p.total_amount)
        .fold(0.0_f64, f64::max);
    let sizes = view
        .scatter
        .iter()
        .map(|p| {
            if max_total > 0.0 {
                6.0 + 34.0 * (p.total_amount.max(0.0) / max_total).sqrt()
            } else {
                6.0
            }
        })
        .collect::<Vec<_>>();
    let scatter = json!({
        "data": [{
            "type": "scatter3d",
            "mode": "markers",
            "x": view.scatter.iter().map(|p| p.month).collect::<Vec<_>>(),
            "y": view.scatter.iter().map(|p| p.employee.as_str()).collect::<Vec<_>>(),
            "z": view.scatter.iter().map(|p| p.customer.as_str()).collect::<Vec<_>>(),
            "text": view.scatter.iter().map(|p| format!("{:.2}", p.total_amount)).collect::<Vec<_>>(),
            "marker": {
                "size": sizes,
                "color": view.scatter.iter().map(|p| p.year).collect::<Vec<_>>(),
                "colorscale": "Viridis",
                "showscale": true,
                "opacity": 0.8,
            },
        }],
        "layout": dark_layout(json!({
            "height": 700,
            "scene": {
                "xaxis": {"title": {"text": "Month"}},
                "yaxis": {"title": {"text": "Employee"}},
                "zaxis": {"title": {"text": "Customer"}},
            },
        })),
    });

    json!({
        "monthly": monthly,
        "delivered": donut(&view.delivered_by_country),
        "undelivered": donut(&view.undelivered_by_country),
        "scatter": scatter,
    })
}
