//! Rendering of decrypted records and record listings.

use serde_json::json;

use crate::output::OutputMode;
use crate::payload::{DecipheredPayload, ItemData};
use crate::vault::RecordSummary;

pub fn print_summaries(summaries: &[RecordSummary], mode: &OutputMode) {
    if mode.json {
        let rows: Vec<serde_json::Value> = summaries
            .iter()
            .map(|summary| {
                json!({
                    "id": summary.client_side_id,
                    "kind": summary.kind.as_str(),
                    "name": summary.name,
                    "folder": summary.folder,
                    "version": summary.version,
                    "updated_at": summary.updated_at,
                })
            })
            .collect();
        println!("{}", json!(rows));
        return;
    }

    if summaries.is_empty() {
        println!("vault is empty");
        return;
    }

    for summary in summaries {
        let location = match &summary.folder {
            Some(folder) => format!("{folder}/{}", summary.name),
            None => summary.name.clone(),
        };
        println!(
            "{}  [{}]  {}  v{}",
            summary.client_side_id,
            summary.kind.as_str(),
            location,
            summary.version
        );
    }
}

pub fn print_item(client_side_id: &str, payload: &DecipheredPayload, mode: &OutputMode) {
    if mode.json {
        println!(
            "{}",
            json!({
                "id": client_side_id,
                "name": payload.metadata.name,
                "folder": payload.metadata.folder,
                "data": data_json(&payload.data),
                "notes": payload.notes,
                "additional_fields": payload.additional_fields,
            })
        );
        return;
    }

    println!("id:     {client_side_id}");
    println!("name:   {}", payload.metadata.name);
    if let Some(folder) = &payload.metadata.folder {
        println!("folder: {folder}");
    }

    match &payload.data {
        ItemData::LoginPassword {
            username,
            password,
            urls,
        } => {
            println!("user:   {username}");
            println!("pass:   {password}");
            for url in urls {
                println!("url:    {url}");
            }
        }
        ItemData::Text { text } => {
            println!("text:   {text}");
        }
        ItemData::Binary { filename, bytes } => {
            println!("file:   {filename} ({} base64 chars)", bytes.len());
        }
        ItemData::BankCard {
            number,
            holder,
            expires,
            cvv,
        } => {
            println!("number: {number}");
            println!("holder: {holder}");
            println!("expiry: {expires}");
            if let Some(cvv) = cvv {
                println!("cvv:    {cvv}");
            }
        }
    }

    if let Some(notes) = &payload.notes {
        println!("notes:  {notes}");
    }
    if let Some(fields) = &payload.additional_fields {
        for (key, value) in fields {
            println!("{key}: {value}");
        }
    }
}

fn data_json(data: &ItemData) -> serde_json::Value {
    match data {
        ItemData::LoginPassword {
            username,
            password,
            urls,
        } => json!({
            "kind": "login",
            "username": username,
            "password": password,
            "urls": urls,
        }),
        ItemData::Text { text } => json!({ "kind": "text", "text": text }),
        ItemData::Binary { filename, bytes } => json!({
            "kind": "binary",
            "filename": filename,
            "bytes": bytes,
        }),
        ItemData::BankCard {
            number,
            holder,
            expires,
            cvv,
        } => json!({
            "kind": "bank-card",
            "number": number,
            "holder": holder,
            "expires": expires,
            "cvv": cvv,
        }),
    }
}
