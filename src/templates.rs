use askama::Template;

use crate::notify::BookingNotice;

#[derive(Template)]
#[template(path = "customer_notice.txt")]
pub struct CustomerNoticeTemplate<'a> {
    pub notice: &'a BookingNotice,
}

#[derive(Template)]
#[template(path = "admin_notice.txt")]
pub struct AdminNoticeTemplate<'a> {
    pub notice: &'a BookingNotice,
}

pub fn render<T: Template>(template: T) -> Result<String, askama::Error> {
    template.render().map_err(|err| {
        log::error!("Template render error: {err}");
        err
    })
}
