use std::collections::HashSet;

use facturas_etl::{
    data::Value,
    dataset::{Cell, Dataset},
    error::EtlError,
    transform::{HeaderPolicy, transform},
};
use proptest::prelude::*;
use serde_json::json;

fn int(value: i64) -> Cell {
    Some(Value::Integer(value))
}

fn text(value: &str) -> Cell {
    Some(Value::String(value.to_string()))
}

fn merged(rows: Vec<Vec<Cell>>) -> Dataset {
    Dataset::from_rows(
        [
            "lpd_id_articulo",
            "lpd_cantidad",
            "ft_id_factura",
            "ft_numfactura",
            "ft_ano_numeracion",
            "cte_cliente",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
        rows,
    )
}

#[test]
fn invoices_appear_in_first_seen_order_with_rows_in_order() {
    let table = merged(vec![
        vec![text("B-1"), int(1), int(200), int(31), int(2024), text("Beta")],
        vec![text("A-1"), int(2), int(100), int(15), int(2024), text("Alfa")],
        vec![text("B-2"), int(3), int(200), int(31), int(2024), text("Beta")],
    ]);
    let invoices = transform(&table, HeaderPolicy::Fail).unwrap();
    assert_eq!(invoices.len(), 2);
    assert_eq!(invoices[0].header.id, json!(200));
    assert_eq!(invoices[0].products.len(), 2);
    assert_eq!(invoices[0].products[1].product.article_id, json!("B-2"));
    assert_eq!(invoices[0].products[1].product.quantity, json!(3));
    assert_eq!(invoices[1].header.client_name, json!("Alfa"));
    assert_eq!(invoices[1].reference(), "15_2024");
}

#[test]
fn absent_columns_become_null_and_observations_empty() {
    let table = merged(vec![vec![text("A-1"), int(2), int(100), int(15), int(2024), None]]);
    let invoices = transform(&table, HeaderPolicy::Warn).unwrap();
    let document = serde_json::to_value(&invoices[0]).unwrap();
    assert_eq!(document["observaciones"], json!(""));
    assert_eq!(document["cliente"], json!(null));
    assert_eq!(document["fecha_factura"], json!(""));
    assert_eq!(document["products"][0]["product"]["precio"], json!(null));
}

#[test]
fn divergent_header_fields_follow_the_policy() {
    let table = merged(vec![
        vec![text("A-1"), int(1), int(100), int(15), int(2024), text("Alfa")],
        vec![text("A-2"), int(1), int(100), int(15), int(2024), text("Alfa S.L.")],
    ]);

    let picked = transform(&table, HeaderPolicy::PickFirst).unwrap();
    assert_eq!(picked[0].header.client_name, json!("Alfa"));
    assert_eq!(picked[0].products.len(), 2);

    let warned = transform(&table, HeaderPolicy::Warn).unwrap();
    assert_eq!(warned, picked);

    let err = transform(&table, HeaderPolicy::Fail).unwrap_err();
    assert!(matches!(
        err,
        EtlError::HeaderConflict { ref invoice, ref field } if invoice == "100" && field == "cliente"
    ));
}

#[test]
fn first_divergent_field_is_reported_in_output_order() {
    let table = merged(vec![
        vec![text("A-1"), int(1), int(100), int(15), int(2024), text("Alfa")],
        vec![text("A-2"), int(1), int(100), int(16), int(2024), text("Beta")],
    ]);
    let err = transform(&table, HeaderPolicy::Fail).unwrap_err();
    assert!(matches!(
        err,
        EtlError::HeaderConflict { ref field, .. } if field == "num_factura"
    ));
}

#[test]
fn row_without_invoice_id_fails_the_transform() {
    let table = merged(vec![
        vec![text("A-1"), int(1), int(100), int(15), int(2024), text("Alfa")],
        vec![text("A-2"), int(1), None, int(15), int(2024), text("Alfa")],
    ]);
    assert!(matches!(
        transform(&table, HeaderPolicy::Warn),
        Err(EtlError::MissingInvoiceId { row: 2 })
    ));
}

#[test]
fn reference_falls_back_to_id_and_is_sanitized() {
    let table = merged(vec![vec![
        text("A-1"),
        int(1),
        text("F/2024 07"),
        None,
        int(2024),
        text("Alfa"),
    ]]);
    let invoices = transform(&table, HeaderPolicy::Warn).unwrap();
    assert_eq!(invoices[0].reference(), "F_2024_07");
}

proptest! {
    #[test]
    fn grouping_is_complete(ids in proptest::collection::vec(1i64..6, 1..40)) {
        let rows = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| vec![text(&format!("A-{idx}")), int(1), int(*id), int(*id), int(2024), text("Alfa")])
            .collect::<Vec<_>>();
        let invoices = transform(&merged(rows), HeaderPolicy::Fail).unwrap();

        let distinct = ids.iter().collect::<HashSet<_>>();
        prop_assert_eq!(invoices.len(), distinct.len());
        for invoice in &invoices {
            let expected = ids.iter().filter(|id| json!(**id) == invoice.header.id).count();
            prop_assert_eq!(invoice.products.len(), expected);
        }
        let total: usize = invoices.iter().map(|invoice| invoice.products.len()).sum();
        prop_assert_eq!(total, ids.len());
    }
}
