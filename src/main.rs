#[rocket::launch]
fn rocket() -> _ {
    let rocket = club_api::rocket();
    log::info!("starting club API server");
    rocket
}
