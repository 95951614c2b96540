//! Prints TypeScript declarations for the API models, for the web dashboard.

use models::{
    dashboard::MechanicDashboard,
    inventory::InventoryItem,
    invoice::{Invoice, InvoiceStatus},
    order::{Order, OrderItem, OrderStatus},
    review::{CreateReview, PendingReview, Review},
    time_slot::TimeSlot,
    user::{LoginRequest, LoginResponse, User, UserRole},
};
use ts_rs::TS;

fn main() {
    let decls = [
        InventoryItem::decl(),
        OrderStatus::decl(),
        OrderItem::decl(),
        Order::decl(),
        InvoiceStatus::decl(),
        Invoice::decl(),
        Review::decl(),
        PendingReview::decl(),
        CreateReview::decl(),
        TimeSlot::decl(),
        UserRole::decl(),
        User::decl(),
        LoginRequest::decl(),
        LoginResponse::decl(),
        MechanicDashboard::decl(),
    ];

    println!("// Generated by `cargo run -p models --bin generate-types`. Do not edit.\n");
    for decl in decls {
        println!("export {decl}\n");
    }
}
