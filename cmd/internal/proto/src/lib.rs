pub mod g2disk {
    tonic::include_proto!("g2disk");
}
